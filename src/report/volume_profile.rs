//! Volume profile dashboard: one scrollable chart and peaks table per symbol

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Duration, FixedOffset, Offset, Utc};
use serde_json::{json, Value};
use std::path::PathBuf;
use tracing::{info, warn};

use super::{html_escape, page, ReportArtifact};
use crate::config::{AppConfig, VolumeProfileConfig};
use crate::sources::{BarSource, FallbackSource, LocalMinuteFile, YahooClient};
use crate::types::{display_name, is_crypto, safe_name, Bar, Interval};
use crate::volume_profile::{build_profile, session_zone, thousands, PeakParams, ProfileParams, VolumeProfile};

pub const KEY: &str = "volume_profile";
pub const TITLE: &str = "Volume Profile Dashboard";

const DISPLAY_OFFSET_SECS: i32 = 8 * 3600;

pub fn profile_params(cfg: &VolumeProfileConfig) -> ProfileParams {
    ProfileParams {
        n_days: cfg.n_days,
        ticks_per_bin: cfg.bins_per_tick,
        value_area_fraction: cfg.value_area_fraction,
        zone: chrono_tz::UTC,
        peaks: PeakParams::default(),
    }
}

/// Configured order with gold moved to the front
pub fn ordered_symbols(symbols: &[String]) -> Vec<String> {
    let (gold, rest): (Vec<String>, Vec<String>) = symbols.iter().cloned().partition(|s| display_name(s) == "GC");
    gold.into_iter().chain(rest).collect()
}

/// Client-side state for one symbol: figure plus the scroll and table data
pub fn symbol_payload(vp: &VolumeProfile) -> Value {
    json!({
        "name": vp.name,
        "figure": vp.figure(),
        "allowedPrices": vp.allowed_prices,
        "windowSize": vp.window.window_bins,
        "initialOffset": vp.window.initial_offset,
        "maxOffset": vp.window.max_offset,
        "spotPrice": vp.spot_price,
        "peaks": vp.peaks.iter().map(|p| json!({"price": p.price, "volume": thousands(p.volume)})).collect::<Vec<_>>(),
    })
}

/// Processed span and last bar in UTC+8
pub fn span_text(vp: &VolumeProfile) -> String {
    let hkt = FixedOffset::east_opt(DISPLAY_OFFSET_SECS).unwrap_or_else(|| Utc.fix());
    let span = match (vp.dates.first(), vp.dates.last()) {
        (Some(a), Some(b)) => format!("{} to {} ({} sessions)", a, b, vp.dates.len()),
        _ => "no sessions".to_string(),
    };
    format!(
        "{} | Latest bar {} UTC+8 | POC {:.2} | VAL {:.2} | VAH {:.2}",
        span,
        vp.last_bar.with_timezone(&hkt).format("%Y-%m-%d %H:%M"),
        vp.poc_price,
        vp.val_price,
        vp.vah_price
    )
}

fn section(vp: &VolumeProfile, active: bool) -> String {
    let id = safe_name(&vp.name);
    format!(
        "<section id=\"panel-{id}\" class=\"vp-panel{hidden}\">\n\
         <h2>{name} Volume Profile</h2>\n<p class=\"span\">{span}</p>\n\
         <div class=\"vp-wrapper\">\n\
         <div id=\"chart-{id}\" class=\"vp-chart\"></div>\n\
         <input type=\"range\" class=\"price-slider\" id=\"slider-{id}\" orient=\"vertical\">\n\
         <div class=\"table-container\"><table><thead><tr><th>Price</th><th>Volume</th></tr></thead>\
         <tbody id=\"table-body-{id}\"></tbody></table></div>\n\
         </div>\n</section>",
        id = id,
        hidden = if active { "" } else { " hidden" },
        name = html_escape(&vp.name),
        span = html_escape(&span_text(vp)),
    )
}

const SCRIPT: &str = r#"
function rangeAt(data, offset) {
  var prices = data.allowedPrices;
  if (data.windowSize <= 0 || prices.length === 0) return null;
  var start = Math.min(Math.max(offset, 0), data.maxOffset);
  return { lower: prices[start], upper: prices[start + data.windowSize - 1], start: start };
}
function fillTable(id, range) {
  var data = symbolData[id];
  var body = document.getElementById('table-body-' + id);
  var rows = data.peaks.filter(function (p) { return p.price >= range.lower && p.price <= range.upper; })
    .map(function (p) { return '<tr class="peak"><td>' + p.price.toFixed(2) + '</td><td>' + p.volume + '</td></tr>'; });
  if (data.spotPrice >= range.lower && data.spotPrice <= range.upper) {
    rows.push('<tr class="spot"><td>' + data.spotPrice.toFixed(2) + '</td><td>SPOT</td></tr>');
  }
  body.innerHTML = rows.join('');
}
function showRange(id, offset) {
  var range = rangeAt(symbolData[id], offset);
  if (!range) return;
  Plotly.relayout('chart-' + id, { 'yaxis.range': [range.lower, range.upper] });
  fillTable(id, range);
}
function boot(id) {
  var data = symbolData[id];
  var fig = data.figure;
  fig.layout.dragmode = false;
  Plotly.newPlot('chart-' + id, fig.data, fig.layout, { scrollZoom: false, displaylogo: false, responsive: true });
  var slider = document.getElementById('slider-' + id);
  slider.min = 0;
  slider.max = Math.max(data.maxOffset, 0);
  slider.value = data.initialOffset;
  slider.disabled = data.maxOffset === 0;
  slider.addEventListener('input', function (e) { showRange(id, parseInt(e.target.value, 10)); });
  showRange(id, data.initialOffset);
}
document.getElementById('symbol-selector').addEventListener('change', function (e) {
  document.querySelectorAll('.vp-panel').forEach(function (p) { p.classList.add('hidden'); });
  document.getElementById('panel-' + e.target.value).classList.remove('hidden');
  window.dispatchEvent(new Event('resize'));
});
Object.keys(symbolData).forEach(boot);
"#;

pub fn render(profiles: &[VolumeProfile], generated_at: DateTime<Utc>) -> String {
    let mut options = String::new();
    let mut sections = Vec::new();
    let mut payload = serde_json::Map::new();
    for (i, vp) in profiles.iter().enumerate() {
        let id = safe_name(&vp.name);
        options.push_str(&format!("<option value=\"{}\">{}</option>", id, html_escape(&vp.name)));
        sections.push(section(vp, i == 0));
        payload.insert(id, symbol_payload(vp));
    }
    let data = Value::Object(payload).to_string().replace("</", "<\\/");

    let style = r#"
body { background: #111; color: #eee; }
.hidden { display: none; }
.span { color: #aaa; font-size: 13px; }
.vp-wrapper { display: flex; gap: 12px; align-items: stretch; }
.vp-chart { flex: 1; min-height: 900px; }
.price-slider { writing-mode: vertical-lr; direction: rtl; width: 24px; }
.table-container { width: 240px; max-height: 900px; overflow-y: auto; }
.table-container th { background: #333; color: #eee; }
tr.peak td { color: #ff6666; }
tr.spot td { color: #00FF99; font-weight: bold; }
"#;
    let body = format!(
        "<h1>{title}</h1>\n<p class=\"span\">Generated {generated} UTC</p>\n\
         <select id=\"symbol-selector\">{options}</select>\n{sections}\n\
         <script>var symbolData = {data};{script}</script>",
        title = TITLE,
        generated = generated_at.format("%Y-%m-%d %H:%M"),
        options = options,
        sections = sections.join("\n"),
        data = data,
        script = SCRIPT,
    );
    page(TITLE, style, &body)
}

/// Minute bars from the local file, the crypto fallback chain or Yahoo
async fn load_bars(
    cfg: &AppConfig,
    yahoo: &YahooClient,
    crypto: Option<&FallbackSource>,
    locals: &[(String, PathBuf)],
    symbol: &str,
) -> Result<Vec<Bar>> {
    let end = Utc::now();
    let start = end - Duration::days(cfg.volume_profile.lookback_days);

    if let Some((local_symbol, path)) = locals.iter().find(|(s, _)| s.eq_ignore_ascii_case(symbol)) {
        let file = LocalMinuteFile {
            symbol: local_symbol.clone(),
            path: path.clone(),
        };
        return Ok(file.fetch_bars(symbol, start, end, Interval::Min1).await?);
    }
    if is_crypto(symbol) {
        let source = crypto.context("No crypto source configured")?;
        return Ok(source.fetch_bars(symbol, start, end, Interval::Min1).await?);
    }
    Ok(yahoo.intraday_batched(symbol, start, end, Interval::Min1).await?)
}

/// Build every configured profile; symbols that fail are logged and skipped
pub async fn build_all(cfg: &AppConfig, yahoo: &YahooClient) -> Result<Vec<VolumeProfile>> {
    let yahoo = yahoo.clone().with_max_intraday_days(cfg.volume_profile.max_intraday_days);
    let crypto = match FallbackSource::crypto(&cfg.sources) {
        Ok(source) => Some(source),
        Err(e) => {
            warn!(error = %e, "Crypto sources unavailable");
            None
        }
    };
    let locals = cfg.local_minute_files();
    let params = profile_params(&cfg.volume_profile);

    let mut symbols = ordered_symbols(&cfg.volume_profile.symbols);
    let extra: Vec<String> = locals
        .iter()
        .map(|(s, _)| s.clone())
        .filter(|s| !symbols.contains(s))
        .collect();
    symbols.extend(extra);

    let mut profiles = Vec::new();
    for symbol in &symbols {
        info!(symbol = %symbol, "📥 Fetching minute bars");
        let bars = match load_bars(cfg, &yahoo, crypto.as_ref(), &locals, symbol).await {
            Ok(bars) => bars,
            Err(e) => {
                warn!(symbol = %symbol, error = %e, "Volume profile skipped");
                continue;
            }
        };
        let local = locals.iter().any(|(s, _)| s.eq_ignore_ascii_case(symbol));
        let params = ProfileParams {
            zone: session_zone(symbol, local),
            ..params
        };
        match build_profile(&display_name(symbol), &bars, is_crypto(symbol), &params) {
            Ok(vp) => profiles.push(vp),
            Err(e) => warn!(symbol = %symbol, error = %e, "Volume profile skipped"),
        }
    }
    Ok(profiles)
}

pub async fn generate(cfg: &AppConfig, yahoo: &YahooClient) -> Result<ReportArtifact> {
    let profiles = build_all(cfg, yahoo).await?;
    if profiles.is_empty() {
        bail!("No volume profile could be built");
    }
    info!(count = profiles.len(), "✅ Volume profile dashboard built");
    Ok(ReportArtifact::new(KEY, TITLE, render(&profiles, Utc::now())))
}
