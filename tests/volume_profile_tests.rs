//! Volume profile built end to end from a local minute file

#[cfg(test)]
mod tests {
    use market_dashboard::sources::load_minute_csv;
    use market_dashboard::volume_profile::{build_profile, session_zone, ProfileParams};
    use std::fmt::Write as _;
    use std::fs;
    use tempfile::tempdir;

    /// Weekdays of 3-14 March 2025 plus Saturday the 8th, 30 bars per day from 10:00 HKT
    fn minute_csv() -> String {
        let mut csv = String::from("timestamp,close_price,minute_volume\n");
        let days = [3u32, 4, 5, 6, 7, 8, 10, 11, 12, 13, 14];
        for (i, day) in days.iter().enumerate() {
            for minute in 0..30u32 {
                let close = 2000.0 + i as f64 + minute as f64 * 0.5;
                writeln!(csv, "2025-03-{:02} 10:{:02}:00,{},10", day, minute, close).unwrap();
            }
        }
        csv
    }

    #[test]
    fn test_local_file_drops_weekend_rows() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("gc_minute.csv");
        fs::write(&path, minute_csv()).unwrap();

        let bars = load_minute_csv(&path).unwrap();
        assert_eq!(bars.len(), 10 * 30);
        assert!(bars.windows(2).all(|w| w[0].ts < w[1].ts));
    }

    #[test]
    fn test_profile_over_last_sessions() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("gc_minute.csv");
        fs::write(&path, minute_csv()).unwrap();
        let bars = load_minute_csv(&path).unwrap();

        let params = ProfileParams {
            n_days: 3,
            zone: session_zone("HSI2512", true),
            ..ProfileParams::default()
        };
        let vp = build_profile("GC", &bars, false, &params).unwrap();

        assert_eq!(vp.dates.len(), 3);
        assert_eq!(vp.dates.last().unwrap().to_string(), "2025-03-14");
        assert_eq!(vp.spot_price, 2010.0 + 14.5);
        assert!((vp.total_volume - 900.0).abs() < 1e-9);
        assert!(vp.val_price <= vp.poc_price && vp.poc_price <= vp.vah_price);
        assert!((vp.bin_size - 1.5).abs() < 1e-12);
    }
}
