//! Single-file dashboard: every report embedded behind a section selector

use chrono::{DateTime, FixedOffset};

use crate::report::{html_escape, page, ReportArtifact};

/// `{prefix}YYYYMMDD_HHMM.html` in schedule-local time
pub fn dashboard_file_name(prefix: &str, local: DateTime<FixedOffset>) -> String {
    format!("{}{}.html", prefix, local.format("%Y%m%d_%H%M"))
}

pub fn dashboard_caption(local: DateTime<FixedOffset>, file_name: &str) -> String {
    format!(
        "📊 Dashboard refreshed\nCompleted: {} HKT\n\nAttachment: {}",
        local.format("%Y-%m-%d %H:%M"),
        file_name
    )
}

const SCRIPT: &str = r#"
document.getElementById('view-selector').addEventListener('change', function (e) {
  document.querySelectorAll('.view').forEach(function (v) { v.classList.add('hidden'); });
  var target = document.getElementById('view-' + e.target.value);
  if (target) { target.classList.remove('hidden'); resize(target.querySelector('iframe')); }
});
function resize(frame) {
  if (!frame || !frame.contentDocument || !frame.contentDocument.body) return;
  frame.style.height = (frame.contentDocument.body.scrollHeight + 40) + 'px';
}
document.querySelectorAll('.view iframe').forEach(function (f) {
  f.addEventListener('load', function () { resize(f); });
});
"#;

/// Each section's full page goes into an escaped `srcdoc`, so its scripts and
/// styles stay isolated.
pub fn assemble_dashboard(sections: &[ReportArtifact], header_extra: &str, local: DateTime<FixedOffset>) -> String {
    let mut options = String::new();
    let mut views = String::new();
    for (i, section) in sections.iter().enumerate() {
        let key = html_escape(&section.key);
        options.push_str(&format!("<option value=\"{}\">{}</option>", key, html_escape(&section.title)));
        views.push_str(&format!(
            "<div id=\"view-{key}\" class=\"view{hidden}\"><iframe title=\"{title}\" srcdoc=\"{doc}\"></iframe></div>\n",
            key = key,
            hidden = if i == 0 { "" } else { " hidden" },
            title = html_escape(&section.title),
            doc = html_escape(&section.html),
        ));
    }

    let style = r#"
.header { display: flex; align-items: center; gap: 24px; margin-bottom: 16px; }
.fx-banner { font-weight: bold; color: #2c3e50; }
.view iframe { width: 100%; min-height: 900px; border: none; }
.hidden { display: none; }
"#;
    let body = format!(
        "<div class=\"header\"><h1>Market Dashboard</h1><span>Updated {updated} HKT</span>{extra}\
         <select id=\"view-selector\">{options}</select></div>\n{views}<script>{script}</script>",
        updated = local.format("%Y-%m-%d %H:%M"),
        extra = header_extra,
        options = options,
        views = views,
        script = SCRIPT,
    );
    page("Market Dashboard", style, &body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn local() -> DateTime<FixedOffset> {
        FixedOffset::east_opt(8 * 3600)
            .unwrap()
            .with_ymd_and_hms(2025, 3, 3, 22, 30, 0)
            .unwrap()
    }

    #[test]
    fn test_file_name_and_caption() {
        let name = dashboard_file_name("Market_Dashboard", local());
        assert_eq!(name, "Market_Dashboard20250303_2230.html");
        assert_eq!(
            dashboard_caption(local(), &name),
            "📊 Dashboard refreshed\nCompleted: 2025-03-03 22:30 HKT\n\nAttachment: Market_Dashboard20250303_2230.html"
        );
    }

    #[test]
    fn test_sections_embedded_escaped() {
        let sections = vec![
            ReportArtifact::new("etf_heatmap", "ETF Sector Heatmap", "<p class=\"x\">A & B</p>".to_string()),
            ReportArtifact::new("spx_vix", "SPX vs VIX", "<p>chart</p>".to_string()),
        ];
        let html = assemble_dashboard(&sections, "<div class=\"fx-banner\">1 USD = 7.8000 HKD</div>", local());
        assert!(html.contains("srcdoc=\"&lt;p class=&quot;x&quot;&gt;A &amp; B&lt;/p&gt;\""));
        assert!(html.contains("<div id=\"view-etf_heatmap\" class=\"view\">"));
        assert!(html.contains("<div id=\"view-spx_vix\" class=\"view hidden\">"));
        assert!(html.contains("<option value=\"spx_vix\">SPX vs VIX</option>"));
        assert!(html.contains("1 USD = 7.8000 HKD"));
    }
}
