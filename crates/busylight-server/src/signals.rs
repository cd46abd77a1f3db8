//! Unix signals as loop events.
//!
//! Each handled signal maps to exactly one [`Event`]; deliveries are queued on
//! the loop's input channel in the order they arrive.

use busylight_core::Event;
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::error::ServerResult;
use crate::event_loop::LoopInput;

/// Handled signals, by name, with the event each one delivers.
pub fn signal_events() -> Vec<(&'static str, SignalKind, Event)> {
    vec![
        ("SIGUSR1", SignalKind::user_defined1(), Event::ZoomMuted),
        ("SIGUSR2", SignalKind::user_defined2(), Event::ZoomOpenMic),
        ("SIGHUP", SignalKind::hangup(), Event::ZoomEnded),
        ("SIGWINCH", SignalKind::window_change(), Event::ToggleActive),
        (
            "SIGVTALRM",
            SignalKind::from_raw(libc::SIGVTALRM),
            Event::ToggleUrgent,
        ),
        ("SIGCHLD", SignalKind::child(), Event::ToggleLowPriority),
        refresh_signal(),
        ("SIGINT", SignalKind::interrupt(), Event::Terminate),
        ("SIGTERM", SignalKind::terminate(), Event::Terminate),
    ]
}

#[cfg(any(
    target_os = "dragonfly",
    target_os = "freebsd",
    target_os = "illumos",
    target_os = "macos",
    target_os = "netbsd",
    target_os = "openbsd"
))]
fn refresh_signal() -> (&'static str, SignalKind, Event) {
    ("SIGINFO", SignalKind::info(), Event::ForceRefresh)
}

#[cfg(not(any(
    target_os = "dragonfly",
    target_os = "freebsd",
    target_os = "illumos",
    target_os = "macos",
    target_os = "netbsd",
    target_os = "openbsd"
)))]
fn refresh_signal() -> (&'static str, SignalKind, Event) {
    ("SIGALRM", SignalKind::alarm(), Event::ForceRefresh)
}

/// Installs every handler, then spawns one forwarding task per signal.
///
/// Installation happens before any task starts, so a failure leaves no
/// handler half-running.
pub fn forward_signals(inputs: mpsc::Sender<LoopInput>) -> ServerResult<Vec<JoinHandle<()>>> {
    let mut streams = Vec::new();
    for (name, kind, event) in signal_events() {
        streams.push((name, signal(kind)?, event));
    }

    let tasks = streams
        .into_iter()
        .map(|(name, mut stream, event)| {
            let inputs = inputs.clone();
            tokio::spawn(async move {
                while stream.recv().await.is_some() {
                    info!(signal = name, %event, "Received signal");
                    if inputs.send(LoopInput::Event(event)).await.is_err() {
                        break;
                    }
                }
                debug!(signal = name, "Signal forwarder stopped");
            })
        })
        .collect();

    info!("Signal handlers installed");
    Ok(tasks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[cfg(target_os = "linux")]
    #[test]
    fn signal_table() {
        let table = signal_events()
            .into_iter()
            .map(|(name, _, event)| format!("{name} -> {event}"))
            .collect::<Vec<_>>()
            .join("\n");
        insta::assert_snapshot!(table, @r"
        SIGUSR1 -> zoom-muted
        SIGUSR2 -> zoom-open-mic
        SIGHUP -> zoom-ended
        SIGWINCH -> toggle-active
        SIGVTALRM -> toggle-urgent
        SIGCHLD -> toggle-low-priority
        SIGALRM -> refresh
        SIGINT -> terminate
        SIGTERM -> terminate
        ");
    }

    #[test]
    fn every_event_has_a_signal() {
        let events: Vec<Event> = signal_events().into_iter().map(|(_, _, e)| e).collect();
        for event in Event::ALL {
            assert!(events.contains(&event), "{event} has no signal");
        }
    }

    #[tokio::test]
    async fn delivers_events_in_order() {
        let (tx, mut rx) = mpsc::channel(8);
        let tasks = forward_signals(tx).unwrap();

        unsafe {
            libc::raise(libc::SIGUSR2);
        }
        let first = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap();
        assert!(matches!(first, Some(LoopInput::Event(Event::ZoomOpenMic))));

        unsafe {
            libc::raise(libc::SIGVTALRM);
        }
        let second = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap();
        assert!(matches!(second, Some(LoopInput::Event(Event::ToggleUrgent))));

        for task in tasks {
            task.abort();
        }
    }
}
