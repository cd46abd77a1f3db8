//! Status command.

use std::fmt::Write;

use busylight_protocol::{Request, Response, StatusInfo};
use chrono::{DateTime, Utc};

use crate::error::{ClientError, ClientResult};
use crate::socket::SocketClient;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S UTC";

/// Queries the daemon and prints its status.
pub async fn status(client: &SocketClient, json: bool) -> ClientResult<()> {
    let info = match client.send(Request::Status).await? {
        Response::Status { info } => info,
        other => {
            return Err(ClientError::Protocol(format!(
                "unexpected response to status: {other:?}"
            )));
        }
    };

    if json {
        let rendered = serde_json::to_string_pretty(&info)
            .map_err(|e| ClientError::Protocol(format!("failed to render status: {e}")))?;
        println!("{rendered}");
    } else {
        print!("{}", render(&info));
    }
    Ok(())
}

fn yes_no(flag: bool) -> &'static str {
    if flag { "yes" } else { "no" }
}

fn time(dt: DateTime<Utc>) -> String {
    dt.format(TIME_FORMAT).to_string()
}

fn uptime(seconds: u64) -> String {
    let (h, m, s) = (seconds / 3600, seconds % 3600 / 60, seconds % 60);
    if h > 0 {
        format!("{h}h {m:02}m {s:02}s")
    } else if m > 0 {
        format!("{m}m {s:02}s")
    } else {
        format!("{s}s")
    }
}

/// Renders a status snapshot for the terminal.
pub fn render(info: &StatusInfo) -> String {
    let display = &info.display;
    let call = match (display.zoom_active, display.zoom_muted) {
        (false, _) => "none",
        (true, true) => "muted",
        (true, false) => "open mic",
    };

    let mut out = String::new();
    let mut line = |label: &str, value: &str| {
        let _ = writeln!(out, "{:<14}{value}", format!("{label}:"));
    };
    line("light", &info.indicator.to_string());
    line("active", yes_no(display.daemon_active));
    line("calendar", if display.calendar_busy { "busy" } else { "free" });
    line("call", call);
    line("urgent", yes_no(display.urgent));
    line("low priority", yes_no(display.low_priority));
    line("device", info.device.as_deref().unwrap_or("-"));
    line(
        "last poll",
        &info.last_poll.map(time).unwrap_or_else(|| "never".into()),
    );
    line(
        "next change",
        &info.next_transition.map(time).unwrap_or_else(|| "-".into()),
    );
    line("uptime", &uptime(info.uptime_seconds));

    if info.busy_periods.is_empty() {
        out.push_str("busy periods: none\n");
    } else {
        out.push_str("busy periods:\n");
        for period in &info.busy_periods {
            let _ = writeln!(out, "  {} - {}", time(period.start()), time(period.end()));
        }
    }
    out
}
