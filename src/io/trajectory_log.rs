//! Plain-text trajectory files.
//!
//! One line per pose, whitespace separated:
//!
//! ```text
//! timestamp rx ry rz tx ty tz
//! ```

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use crate::core::types::{Pose6D, Trajectory};
use crate::error::{Result, SlamError};

/// Write a trajectory to a file, one `timestamp rx ry rz tx ty tz` line per
/// entry.
pub fn save(trajectory: &Trajectory, path: &Path) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    for entry in trajectory.iter() {
        let p = &entry.pose;
        writeln!(
            writer,
            "{} {} {} {} {} {} {}",
            entry.timestamp, p.rx, p.ry, p.rz, p.tx, p.ty, p.tz
        )?;
    }
    writer.flush()?;
    Ok(())
}

/// Read a trajectory written by [`save`]. Blank lines are ignored.
pub fn load(path: &Path) -> Result<Trajectory> {
    let reader = BufReader::new(File::open(path)?);
    let mut trajectory = Trajectory::new();

    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let fields: Vec<f64> = trimmed
            .split_whitespace()
            .map(|f| {
                f.parse::<f64>().map_err(|_| {
                    SlamError::TrajectoryParse(format!(
                        "line {}: invalid number {f:?}",
                        line_no + 1
                    ))
                })
            })
            .collect::<Result<_>>()?;
        if fields.len() != 7 {
            return Err(SlamError::TrajectoryParse(format!(
                "line {}: expected 7 fields, found {}",
                line_no + 1,
                fields.len()
            )));
        }
        trajectory.push(
            fields[0],
            Pose6D::new(fields[1], fields[2], fields[3], fields[4], fields[5], fields[6]),
        );
    }
    Ok(trajectory)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_save_load_roundtrip() {
        let mut trajectory = Trajectory::new();
        trajectory.push(0.0, Pose6D::identity());
        trajectory.push(0.1, Pose6D::new(0.01, -0.02, 0.03, 1.5, -2.5, 0.25));

        let dir = std::env::temp_dir().join("gati_slam_trajectory_test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("roundtrip.txt");
        save(&trajectory, &path).unwrap();
        let loaded = load(&path).unwrap();

        assert_eq!(loaded.len(), 2);
        let entry = &loaded.entries()[1];
        assert_relative_eq!(entry.timestamp, 0.1);
        assert_relative_eq!(entry.pose.ry, -0.02);
        assert_relative_eq!(entry.pose.ty, -2.5);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_load_rejects_malformed_line() {
        let dir = std::env::temp_dir().join("gati_slam_trajectory_test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("malformed.txt");
        std::fs::write(&path, "0.0 1.0 2.0\n").unwrap();

        assert!(matches!(
            load(&path),
            Err(SlamError::TrajectoryParse(_))
        ));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let path = Path::new("/nonexistent/gati-slam/trajectory.txt");
        assert!(matches!(load(path), Err(SlamError::Io(_))));
    }
}
