//! Daemon entry point: wires configuration, logging, signals, the control
//! socket and the light into one [`EventLoop`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use busylight_core::{TracingConfig, init_tracing};
use busylight_providers::CalendarSource;
use busylight_providers::google::{GoogleConfig, GoogleFreeBusySource, OAuthCredentials};
use tracing::{Level, info};

use crate::config::DaemonConfig;
use crate::error::ServerResult;
use crate::event_loop::{ConfigLoader, EventLoop, input_channel};
use crate::pidfile::PidFile;
use crate::signals::forward_signals;
use crate::socket::ControlServer;
use crate::transport::SerialTransport;

/// Reads the daemon configuration from a TOML file and builds the Google
/// free/busy source it names.
#[derive(Debug, Clone)]
pub struct FileConfigLoader {
    path: PathBuf,
}

impl FileConfigLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigLoader for FileConfigLoader {
    fn load(&self) -> ServerResult<DaemonConfig> {
        DaemonConfig::load(&self.path)
    }

    fn build_source(&self, config: &DaemonConfig) -> ServerResult<Arc<dyn CalendarSource>> {
        let credentials = OAuthCredentials::from_file(&config.credential_file)?;
        let google = GoogleConfig::new(credentials, &config.token_file)
            .with_timeout(config.calendar_timeout());
        Ok(Arc::new(GoogleFreeBusySource::new(google)?))
    }
}

/// Options for [`run_daemon`].
#[derive(Debug, Clone)]
pub struct DaemonOptions {
    pub config_path: PathBuf,
    /// Log at debug level instead of info.
    pub debug: bool,
}

/// Runs the daemon in the foreground until it is told to terminate.
///
/// Any failure before the control loop is running is returned and should end
/// the process with a non-zero status.
pub async fn run_daemon(options: DaemonOptions) -> ServerResult<()> {
    let loader = FileConfigLoader::new(&options.config_path);
    let config = loader.load()?;

    let mut tracing_config = TracingConfig::daemon().with_log_file(config.log_file.clone());
    if options.debug {
        tracing_config = tracing_config.with_level(Level::DEBUG);
    }
    init_tracing(tracing_config)?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %loader.path().display(),
        calendars = config.calendars.len(),
        "Starting busylight daemon"
    );

    let _pid_file = PidFile::acquire(&config.pid_file)?;

    let (inputs, rx) = input_channel();
    let signal_tasks = forward_signals(inputs.clone())?;
    let control = ControlServer::bind(&config.socket_path).await?;

    let source = loader.build_source(&config)?;
    let event_loop = EventLoop::new(
        config,
        Box::new(loader),
        source,
        Box::new(SerialTransport::new()),
        rx,
    );

    let result = tokio::select! {
        result = event_loop.run() => result,
        () = control.serve(inputs) => Ok(()),
    };

    for task in signal_tasks {
        task.abort();
    }
    info!("Daemon stopped");
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServerError;
    use busylight_providers::ProviderErrorCode;
    use tempfile::tempdir;

    fn write_config(dir: &Path) -> PathBuf {
        let credentials = dir.join("credentials.json");
        std::fs::write(
            &credentials,
            r#"{"installed": {"client_id": "id.apps.googleusercontent.com", "client_secret": "s3cret"}}"#,
        )
        .unwrap();

        let path = dir.join("config.toml");
        std::fs::write(
            &path,
            format!(
                r#"
credential_file = "{}"
token_file = "{}"
[device]
path = "/dev/ttyACM0"
[calendars.primary]
"#,
                credentials.display(),
                dir.join("token.json").display()
            ),
        )
        .unwrap();
        path
    }

    #[test]
    fn loader_reads_file_each_time() {
        let dir = tempdir().unwrap();
        let path = write_config(dir.path());
        let loader = FileConfigLoader::new(&path);

        let first = loader.load().unwrap();
        assert_eq!(first.calendars.len(), 1);

        let updated = std::fs::read_to_string(&path).unwrap() + "[calendars.team]\n";
        std::fs::write(&path, updated).unwrap();
        assert_eq!(loader.load().unwrap().calendars.len(), 2);
    }

    #[test]
    fn loader_builds_google_source() {
        let dir = tempdir().unwrap();
        let loader = FileConfigLoader::new(write_config(dir.path()));
        let config = loader.load().unwrap();

        let source = loader.build_source(&config).unwrap();
        assert_eq!(source.name(), "google");
    }

    #[test]
    fn missing_credentials_fail_source() {
        let dir = tempdir().unwrap();
        let loader = FileConfigLoader::new(write_config(dir.path()));
        let mut config = loader.load().unwrap();
        config.credential_file = dir.path().join("absent.json");

        let Err(ServerError::Provider(e)) = loader.build_source(&config) else {
            panic!("expected provider error");
        };
        assert_eq!(e.code(), ProviderErrorCode::ConfigurationError);
    }

    #[tokio::test]
    async fn missing_config_is_fatal() {
        let dir = tempdir().unwrap();
        let result = run_daemon(DaemonOptions {
            config_path: dir.path().join("config.toml"),
            debug: false,
        })
        .await;
        assert!(matches!(result, Err(ServerError::ConfigRead { .. })));
    }
}
