use std::collections::BTreeMap;

pub type Tick = u64;

const DEFAULT_US_PER_QUARTER: u32 = 500_000;

#[derive(Clone, Debug)]
pub struct TempoMap {
    ppq: u16,
    segments: Vec<TempoSegment>,
}

#[derive(Clone, Copy, Debug)]
struct TempoSegment {
    start_tick: Tick,
    start_us: u64,
    us_per_quarter: u32,
}

impl TempoMap {
    /// Later entries at the same tick win, matching how a player applies them in order.
    pub fn new(ppq: u16, points: BTreeMap<Tick, u32>) -> Self {
        let mut points: Vec<(Tick, u32)> = points.into_iter().collect();
        if points.first().map_or(true, |(tick, _)| *tick != 0) {
            points.insert(0, (0, DEFAULT_US_PER_QUARTER));
        }

        let ppq = ppq.max(1);
        let mut segments = Vec::with_capacity(points.len());
        let mut current_us = 0u64;
        for (idx, (tick, us_per_quarter)) in points.iter().copied().enumerate() {
            if idx > 0 {
                let (prev_tick, prev_us_per_quarter) = points[idx - 1];
                current_us += ticks_to_us(tick - prev_tick, prev_us_per_quarter, ppq);
            }
            segments.push(TempoSegment {
                start_tick: tick,
                start_us: current_us,
                us_per_quarter,
            });
        }

        Self { ppq, segments }
    }

    /// Fixed tempo, used for SMPTE timecode files where tempo meta events do not apply.
    pub fn constant(ppq: u16, us_per_quarter: u32) -> Self {
        Self::new(ppq, BTreeMap::from([(0, us_per_quarter)]))
    }

    pub fn tick_to_micros(&self, tick: Tick) -> u64 {
        let seg = self.segment_for_tick(tick);
        seg.start_us + ticks_to_us(tick - seg.start_tick, seg.us_per_quarter, self.ppq)
    }

    pub fn tick_to_seconds(&self, tick: Tick) -> f64 {
        self.tick_to_micros(tick) as f64 / 1_000_000.0
    }

    fn segment_for_tick(&self, tick: Tick) -> TempoSegment {
        let mut current = self.segments[0];
        for seg in &self.segments {
            if seg.start_tick > tick {
                break;
            }
            current = *seg;
        }
        current
    }
}

fn ticks_to_us(ticks: Tick, us_per_quarter: u32, ppq: u16) -> u64 {
    let ticks = ticks as u128;
    let us_per_quarter = us_per_quarter as u128;
    let ppq = ppq as u128;
    ((ticks * us_per_quarter) / ppq) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_tempo_is_120_bpm() {
        let map = TempoMap::new(480, BTreeMap::new());
        assert_eq!(map.tick_to_micros(480), 500_000);
        assert_eq!(map.tick_to_micros(960), 1_000_000);
    }

    #[test]
    fn tempo_change_applies_from_its_tick() {
        let map = TempoMap::new(480, BTreeMap::from([(480, 250_000)]));
        assert_eq!(map.tick_to_micros(480), 500_000);
        assert_eq!(map.tick_to_micros(960), 750_000);
    }
}
