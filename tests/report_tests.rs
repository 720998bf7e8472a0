//! Flat-file flows shared by the report commands

#[cfg(test)]
mod tests {
    use chrono::{Duration, FixedOffset, NaiveDate, TimeZone, Utc};
    use market_dashboard::persistence::{LatestManifest, SectorList, MU_COLUMN, VOL_COLUMN};
    use market_dashboard::pipeline::{assemble_dashboard, dashboard_file_name, DASHBOARD_KEY};
    use market_dashboard::report::vol_refresh::compute_metrics;
    use market_dashboard::report::ReportArtifact;
    use market_dashboard::types::DailySeries;
    use std::collections::HashMap;
    use std::fs;
    use tempfile::tempdir;

    fn growing(days: usize, daily: f64) -> DailySeries {
        let d0 = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        DailySeries::from_pairs((0..days).map(|i| (d0 + Duration::days(i as i64), 100.0 * (1.0 + daily).powi(i as i32))))
    }

    #[test]
    fn test_vol_refresh_writes_back_sector_list() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sector_etfs.csv");
        fs::write(
            &path,
            "Industry,Name,Ticker\nTechnology,Tech Select,XLK\nEnergy,Energy Select,XLE\n",
        )
        .unwrap();

        let mut closes = HashMap::new();
        closes.insert("XLK".to_string(), growing(300, 0.001));
        // Too short for a one-year estimate
        closes.insert("XLE".to_string(), growing(100, 0.001));
        let metrics = compute_metrics(&closes);
        assert_eq!(metrics.len(), 1);

        let mut list = SectorList::load(&path).unwrap();
        list.set_vol_metrics(&metrics);
        list.save(&path).unwrap();

        let reloaded = SectorList::load(&path).unwrap();
        assert_eq!(reloaded.tickers(), vec!["XLK", "XLE"]);
        let mu = reloaded.metric("XLK", MU_COLUMN).unwrap();
        assert!((mu - 0.1).abs() < 1e-6);
        assert!(reloaded.metric("XLK", VOL_COLUMN).unwrap() < 1e-3);
        assert_eq!(reloaded.metric("XLE", MU_COLUMN), None);
    }

    #[test]
    fn test_dashboard_written_and_recorded() {
        let dir = tempdir().unwrap();
        let local = FixedOffset::east_opt(8 * 3600)
            .unwrap()
            .with_ymd_and_hms(2025, 3, 3, 22, 30, 0)
            .unwrap();
        let sections = vec![ReportArtifact::new("etf_heatmap", "ETF Sector Heatmap", "<p>heat</p>".to_string())];

        let mut manifest = LatestManifest::load(dir.path());
        let section_path = sections[0].write_to(dir.path()).unwrap();
        manifest.record("etf_heatmap", "ETF Sector Heatmap", &section_path, local.with_timezone(&Utc));

        let dashboard = dir.path().join(dashboard_file_name("Market_Dashboard", local));
        fs::write(&dashboard, assemble_dashboard(&sections, "", local)).unwrap();
        manifest.record(DASHBOARD_KEY, "Market Dashboard", &dashboard, local.with_timezone(&Utc));
        manifest.save(dir.path()).unwrap();

        let reloaded = LatestManifest::load(dir.path());
        assert_eq!(reloaded.sections.len(), 2);
        assert_eq!(reloaded.sections[DASHBOARD_KEY].path, dashboard);
        assert!(fs::read_to_string(&dashboard).unwrap().contains("view-etf_heatmap"));
        assert!(section_path.ends_with("etf_heatmap.html"));
    }
}
