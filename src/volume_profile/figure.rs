//! Plotly figure for a volume profile

use serde_json::{json, Value};

use super::VolumeProfile;

const SPOT_COLOR: &str = "#00FF99";
const X_HEADROOM: f64 = 1.35;

impl VolumeProfile {
    /// Horizontal bar chart with a dashed spot line, as a Plotly `{data, layout}` object
    pub fn figure(&self) -> Value {
        let x_max = if self.max_volume > 0.0 {
            self.max_volume * X_HEADROOM
        } else {
            1.0
        };
        let spot_x = self.max_volume * X_HEADROOM * 0.9;

        let bars = json!({
            "type": "bar",
            "orientation": "h",
            "x": self.rows.iter().map(|r| r.volume).collect::<Vec<_>>(),
            "y": self.rows.iter().map(|r| r.price).collect::<Vec<_>>(),
            "marker": {
                "color": self.rows.iter().map(|r| r.color.as_str()).collect::<Vec<_>>(),
                "line": {"width": 0},
            },
            "hovertext": self.rows.iter().map(|r| r.hover.as_str()).collect::<Vec<_>>(),
            "hovertemplate": "%{hovertext}<extra></extra>",
            "name": "Volume Profile",
            "showlegend": false,
            "width": self.bin_size,
        });
        let spot_line = json!({
            "type": "scatter",
            "mode": "lines",
            "x": [0.0, spot_x],
            "y": [self.spot_price, self.spot_price],
            "line": {"color": SPOT_COLOR, "dash": "dash"},
            "showlegend": false,
            "hoverinfo": "skip",
        });
        let spot_label = json!({
            "type": "scatter",
            "mode": "text",
            "x": [spot_x],
            "y": [self.spot_price],
            "text": ["SPOT"],
            "textposition": "middle right",
            "textfont": {"color": SPOT_COLOR},
            "showlegend": false,
            "hoverinfo": "skip",
        });

        let layout = json!({
            "title": format!(
                "{} - {} Day Volume Profile<br>Spot Price ${:.2}",
                self.name, self.n_days, self.spot_price
            ),
            "xaxis": {
                "title": "Volume",
                "showgrid": false,
                "zeroline": false,
                "range": [0.0, x_max],
            },
            "yaxis": {
                "title": "Price ($)",
                "showgrid": false,
                "range": [self.window.initial_range.lower, self.window.initial_range.upper],
                "dtick": self.window.tick_spacing(),
                "tickformat": "d",
                "autorange": false,
                "fixedrange": true,
            },
            "plot_bgcolor": "black",
            "paper_bgcolor": "black",
            "font": {"color": "white", "size": 11},
            "margin": {"l": 140, "r": 60, "t": 100, "b": 100},
            "width": 1700,
        });

        json!({ "data": [bars, spot_line, spot_label], "layout": layout })
    }
}
