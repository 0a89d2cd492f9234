use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

/// Per-series data points, dumped as one CSV row each.
pub struct StatsAccumulator<T: ToString> {
    points: BTreeMap<String, Vec<(u64, T)>>,
}

impl<T: ToString> Default for StatsAccumulator<T> {
    fn default() -> Self {
        Self {
            points: BTreeMap::new(),
        }
    }
}

impl<T: ToString> StatsAccumulator<T> {
    pub fn add_stats(&mut self, series: &str, point: u64, data: T) {
        let points = self.points.entry(series.to_string()).or_insert(vec![]);
        points.push((point, data));
    }

    pub fn series(&self, series: &str) -> &[(u64, T)] {
        self.points.get(series).map_or(&[], |points| points.as_slice())
    }

    pub fn dump_stats(&self, path: &Path, format: &str) -> anyhow::Result<()> {
        let mut stats = File::create(path)?;
        stats.write_all(format!("scenario,index,{}\n", format).as_bytes())?;
        for (series, points) in self.points.iter() {
            for (index, data) in points {
                stats.write_all(format!("{},{},{}\n", series, index, data.to_string()).as_bytes())?;
            }
        }
        Ok(())
    }
}

/// One timed ingestion of a transaction.
#[derive(Debug, Default, Clone, Copy)]
pub struct IngestStats {
    pub elapsed: Duration,
    pub involved: bool,
}

impl IngestStats {
    pub const FORMAT: &'static str = "micros,involved";
}

impl fmt::Display for IngestStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.elapsed.as_micros(), self.involved)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::stats::{IngestStats, StatsAccumulator};

    #[test]
    fn check_serialize() {
        assert_eq!(IngestStats::default().to_string(), String::from("0,false"));
        let stats = IngestStats {
            elapsed: Duration::from_micros(1500),
            involved: true,
        };
        assert_eq!(stats.to_string(), "1500,true");
    }

    #[test]
    fn dumps_one_row_per_point() {
        let mut stats = StatsAccumulator::default();
        stats.add_stats("plain->blind", 0, IngestStats::default());
        stats.add_stats("plain->blind", 1, IngestStats::default());
        stats.add_stats("anon->anon", 0, IngestStats::default());
        assert_eq!(stats.series("plain->blind").len(), 2);
        assert!(stats.series("missing").is_empty());

        let path = std::env::temp_dir().join(format!("ringstake-stats-{}.csv", std::process::id()));
        stats.dump_stats(&path, IngestStats::FORMAT).unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        let lines: Vec<_> = written.lines().collect();
        assert_eq!(lines[0], "scenario,index,micros,involved");
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[1], "anon->anon,0,0,false");
    }
}
