use crate::config::PresentationConfig;
use crate::model::ResolvedWallpaper;
use crate::{Result, SyncError};
use std::ffi::OsStr;
use std::path::Path;
use std::process::{Command, Stdio};

/// Shows the newest wallpaper to the user. Called at most once per run.
pub trait Presenter {
    fn present(&mut self, image_path: &Path, wallpaper: &ResolvedWallpaper) -> Result<()>;
}

/// Does nothing; used by `--no-present` and headless hosts.
#[derive(Debug, Default)]
pub struct NoopPresenter;

impl Presenter for NoopPresenter {
    fn present(&mut self, image_path: &Path, _wallpaper: &ResolvedWallpaper) -> Result<()> {
        log::info!("presentation skipped for {}", image_path.display());
        Ok(())
    }
}

/// Runs the configured background setter, then launches the notifier.
#[derive(Debug, Clone)]
pub struct CommandPresenter {
    config: PresentationConfig,
}

impl CommandPresenter {
    pub fn new(config: PresentationConfig) -> Self {
        Self { config }
    }
}

impl Presenter for CommandPresenter {
    fn present(&mut self, image_path: &Path, wallpaper: &ResolvedWallpaper) -> Result<()> {
        let args = expand_template(&self.config.background_command, image_path, wallpaper);
        if let Some((program, rest)) = args.split_first() {
            let output = command(program)
                .args(rest)
                .stdin(Stdio::null())
                .output()
                .map_err(|e| spawn_error(program, e))?;
            if !output.status.success() {
                return Err(SyncError::ExternalToolFailed {
                    tool: program.clone(),
                    code: output.status.code(),
                    stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
                });
            }
        }

        // Notifiers such as zenity block until the dialog is dismissed, so
        // only the launch itself is checked.
        let args = expand_template(&self.config.notify_command, image_path, wallpaper);
        if let Some((program, rest)) = args.split_first() {
            command(program)
                .args(rest)
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .spawn()
                .map_err(|e| spawn_error(program, e))?;
        }
        Ok(())
    }
}

pub fn expand_template(
    template: &[String],
    image_path: &Path,
    wallpaper: &ResolvedWallpaper,
) -> Vec<String> {
    let path = image_path.to_string_lossy();
    let date = wallpaper.date.format("%Y-%m-%d").to_string();
    let title = wallpaper
        .title
        .clone()
        .unwrap_or_else(|| format!("Wallpaper of {date}"));

    template
        .iter()
        .map(|arg| {
            arg.replace("{path}", &path)
                .replace("{date}", &date)
                .replace("{title}", &title)
                .replace("{description}", &wallpaper.description)
        })
        .collect()
}

/// Every presentation command goes through here so that an agent started
/// from a scheduler stays invisible.
fn command(program: impl AsRef<OsStr>) -> Command {
    let mut cmd = Command::new(program);
    configure_for_background(&mut cmd);
    cmd
}

/// The agent usually runs from Task Scheduler with no console of its own;
/// without this flag each setter or notifier call flashes a console window.
#[cfg(windows)]
fn configure_for_background(cmd: &mut Command) {
    use std::os::windows::process::CommandExt;

    const CREATE_NO_WINDOW: u32 = 0x0800_0000;
    cmd.creation_flags(CREATE_NO_WINDOW);
}

#[cfg(not(windows))]
fn configure_for_background(_cmd: &mut Command) {}

fn spawn_error(program: &str, e: std::io::Error) -> SyncError {
    match e.kind() {
        std::io::ErrorKind::NotFound => SyncError::ExternalToolMissing {
            tool: program.to_string(),
        },
        _ => SyncError::Io(e),
    }
}
