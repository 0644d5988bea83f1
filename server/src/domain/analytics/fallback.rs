//! Synthetic placeholder data
//!
//! Values are plausible but random. Results built from them are always
//! tagged `synthetic` so callers never mistake them for real data.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::records::{
    DeviceRecord, GeoRecord, PollRecord, Records, StepRecord, TimeSeriesPoint, drop_off_rate,
};
use crate::core::config::FallbackConfig;
use crate::data::pendo::{MetricFamily, Period};

const DEVICES: &[(&str, &str, &str)] = &[
    ("Desktop", "Chrome", "Windows"),
    ("Desktop", "Chrome", "macOS"),
    ("Desktop", "Safari", "macOS"),
    ("Mobile", "Safari", "iOS"),
    ("Mobile", "Chrome", "Android"),
    ("Desktop", "Firefox", "Windows"),
    ("Tablet", "Safari", "iPadOS"),
    ("Desktop", "Edge", "Windows"),
];

const REGIONS: &[(&str, &str)] = &[
    ("United States", "California"),
    ("United States", "New York"),
    ("United Kingdom", "England"),
    ("Germany", "Bavaria"),
    ("France", "Île-de-France"),
    ("Canada", "Ontario"),
    ("Australia", "New South Wales"),
    ("Japan", "Tokyo"),
];

const POLL_RESPONSES: &[&str] = &[
    "Very satisfied",
    "Satisfied",
    "Neutral",
    "Dissatisfied",
    "Very dissatisfied",
];

#[derive(Debug, Clone)]
pub struct FallbackGenerator {
    size: usize,
    seed: Option<u64>,
}

impl FallbackGenerator {
    pub fn new(config: &FallbackConfig) -> Self {
        Self {
            size: config.size.max(1),
            seed: config.seed,
        }
    }

    fn rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        }
    }

    /// Placeholder records for `family` covering `period`
    pub fn generate(&self, family: MetricFamily, period: &Period) -> Records {
        let mut rng = self.rng();
        match family {
            MetricFamily::TimeSeries => Records::TimeSeries(self.time_series(&mut rng, period)),
            MetricFamily::Steps => Records::Steps(self.steps(&mut rng)),
            MetricFamily::Devices => Records::Devices(self.devices(&mut rng)),
            MetricFamily::Geography => Records::Geography(self.geography(&mut rng)),
            MetricFamily::Polls => Records::Polls(self.polls(&mut rng)),
        }
    }

    fn time_series(&self, rng: &mut StdRng, period: &Period) -> Vec<TimeSeriesPoint> {
        period
            .dates()
            .map(|date| {
                let views: u64 = rng.gen_range(50..=500);
                let completions = (views as f64 * rng.gen_range(0.3..0.8)) as u64;
                let dismissals = ((views - completions) as f64 * rng.gen_range(0.2..0.6)) as u64;
                let unique_visitors = (views as f64 * rng.gen_range(0.6..0.95)) as u64;
                TimeSeriesPoint {
                    date,
                    views,
                    completions,
                    dismissals,
                    unique_visitors,
                    drop_off_rate: drop_off_rate(views, completions),
                }
            })
            .collect()
    }

    fn steps(&self, rng: &mut StdRng) -> Vec<StepRecord> {
        let mut viewed: u64 = rng.gen_range(500..=1000);
        (1..=self.size)
            .map(|index| {
                let completed = (viewed as f64 * rng.gen_range(0.75..0.95)) as u64;
                let record = StepRecord {
                    step_index: index as u32,
                    step_id: Some(format!("step-{}", index)),
                    viewed,
                    completed,
                    drop_off_rate: drop_off_rate(viewed, completed),
                };
                viewed = completed;
                record
            })
            .collect()
    }

    fn devices(&self, rng: &mut StdRng) -> Vec<DeviceRecord> {
        let mut records: Vec<DeviceRecord> = DEVICES
            .iter()
            .take(self.size)
            .map(|(device, browser, os)| DeviceRecord {
                device: device.to_string(),
                browser: browser.to_string(),
                os: os.to_string(),
                users: rng.gen_range(10..=1000),
            })
            .collect();
        records.sort_by(|a, b| b.users.cmp(&a.users));
        records
    }

    fn geography(&self, rng: &mut StdRng) -> Vec<GeoRecord> {
        let mut records: Vec<GeoRecord> = REGIONS
            .iter()
            .take(self.size)
            .map(|(country, region)| GeoRecord {
                country: country.to_string(),
                region: region.to_string(),
                users: rng.gen_range(10..=1000),
            })
            .collect();
        records.sort_by(|a, b| b.users.cmp(&a.users));
        records
    }

    fn polls(&self, rng: &mut StdRng) -> Vec<PollRecord> {
        let mut records: Vec<PollRecord> = POLL_RESPONSES
            .iter()
            .take(self.size)
            .map(|response| PollRecord {
                poll_id: "poll-1".to_string(),
                response: response.to_string(),
                count: rng.gen_range(1..=200),
            })
            .collect();
        records.sort_by(|a, b| b.count.cmp(&a.count));
        records
    }
}
