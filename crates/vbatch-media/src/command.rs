//! FFmpeg command building and the encode process runner.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::{MediaError, MediaResult};
use crate::progress::EncodeProgress;

/// Diagnostic lines retained for failure reports.
const STDERR_TAIL_LINES: usize = 20;

/// Fully resolved ffmpeg invocation. Immutable once built; one per pass.
#[derive(Debug, Clone)]
pub struct EncodeCommand {
    /// Input file path
    input: PathBuf,
    /// Output file path (the null device for analysis passes)
    output: PathBuf,
    /// Arguments placed before -i
    input_args: Vec<String>,
    /// Arguments placed after -i
    output_args: Vec<String>,
    /// Whether to overwrite an existing output (`-y` vs `-n`)
    overwrite: bool,
    /// Log level
    log_level: String,
}

impl EncodeCommand {
    /// Create a new encode command.
    pub fn new(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Self {
        Self {
            input: input.as_ref().to_path_buf(),
            output: output.as_ref().to_path_buf(),
            input_args: Vec::new(),
            output_args: Vec::new(),
            overwrite: true,
            log_level: "error".to_string(),
        }
    }

    /// Add an input argument (before -i).
    pub fn input_arg(mut self, arg: impl Into<String>) -> Self {
        self.input_args.push(arg.into());
        self
    }

    /// Add an output argument (after -i).
    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    /// Set the video filter chain.
    pub fn video_filter(self, filter: impl Into<String>) -> Self {
        self.output_arg("-vf").output_arg(filter)
    }

    /// Set the video codec.
    pub fn video_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:v").output_arg(codec)
    }

    /// Set the audio codec.
    pub fn audio_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:a").output_arg(codec)
    }

    /// Set CRF (quality).
    pub fn crf(self, crf: u8) -> Self {
        self.output_arg("-crf").output_arg(crf.to_string())
    }

    /// Set the encoder preset.
    pub fn preset(self, preset: impl Into<String>) -> Self {
        self.output_arg("-preset").output_arg(preset)
    }

    /// Set an explicit video bitrate in bits/second.
    pub fn video_bitrate(self, bps: u64) -> Self {
        self.output_arg("-b:v").output_arg(bps.to_string())
    }

    /// Set the audio bitrate (e.g. "128k").
    pub fn audio_bitrate(self, bitrate: impl Into<String>) -> Self {
        self.output_arg("-b:a").output_arg(bitrate)
    }

    /// Drop the audio stream (analysis passes).
    pub fn no_audio(self) -> Self {
        self.output_arg("-an")
    }

    /// Force the output muxer (e.g. "null" for analysis passes).
    pub fn format(self, format: impl Into<String>) -> Self {
        self.output_arg("-f").output_arg(format)
    }

    /// Mark this invocation as pass 1 or 2 of a two-pass encode.
    pub fn pass_number(self, pass: u8) -> Self {
        self.output_arg("-pass").output_arg(pass.to_string())
    }

    /// Set the two-pass log file prefix.
    pub fn passlog(self, path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_string_lossy().to_string();
        self.output_arg("-passlogfile").output_arg(path)
    }

    /// Overwrite an existing output instead of failing.
    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// Set the log level.
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    pub fn input(&self) -> &Path {
        &self.input
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    /// Build the argument vector.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = Vec::new();

        args.push(if self.overwrite { "-y" } else { "-n" }.to_string());

        args.push("-v".to_string());
        args.push(self.log_level.clone());

        // Progress records interleave with diagnostics on stderr
        args.push("-progress".to_string());
        args.push("pipe:2".to_string());

        args.extend(self.input_args.clone());

        args.push("-i".to_string());
        args.push(self.input.to_string_lossy().to_string());

        args.extend(self.output_args.clone());

        args.push(self.output.to_string_lossy().to_string());

        args
    }
}

/// Platform null device, the output of two-pass analysis runs.
pub fn null_device() -> &'static str {
    if cfg!(windows) {
        "NUL"
    } else {
        "/dev/null"
    }
}

/// Pick the output frame rate: keep sane probed rates, cap at 60,
/// fall back to 30 when the probe gave nothing usable.
pub fn optimal_fps(probed: f64) -> f64 {
    if (20.0..=60.0).contains(&probed) {
        probed
    } else if probed > 60.0 {
        60.0
    } else {
        30.0
    }
}

/// Build the `-vf` chain: frame-rate normalization plus either an explicit
/// scale or an even-dimension clamp (x264 rejects odd sizes).
pub fn video_filter_chain(fps: f64, resolution: Option<(u32, u32)>) -> String {
    match resolution {
        Some((width, height)) => format!("fps={fps},scale={width}:{height}"),
        None => format!("fps={fps},scale=trunc(iw/2)*2:trunc(ih/2)*2"),
    }
}

/// Check if ffmpeg is available.
pub fn check_ffmpeg() -> MediaResult<PathBuf> {
    which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)
}

/// Check if ffprobe is available.
pub fn check_ffprobe() -> MediaResult<PathBuf> {
    which::which("ffprobe").map_err(|_| MediaError::FfprobeNotFound)
}

/// Runner for encode commands with progress parsing, cancellation and
/// stall detection.
pub struct EncodeRunner {
    cancel_rx: Option<watch::Receiver<bool>>,
    stall_grace: Duration,
}

impl Default for EncodeRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl EncodeRunner {
    pub fn new() -> Self {
        Self {
            cancel_rx: None,
            stall_grace: Duration::from_secs(30),
        }
    }

    /// Observe a cancellation signal between progress reads.
    pub fn with_cancel(mut self, cancel_rx: watch::Receiver<bool>) -> Self {
        self.cancel_rx = Some(cancel_rx);
        self
    }

    /// Fail with [`MediaError::Stalled`] when no progress record arrives
    /// within this window of process start.
    pub fn with_stall_grace(mut self, grace: Duration) -> Self {
        self.stall_grace = grace;
        self
    }

    /// Spawn the process and stream its progress into `on_progress`.
    ///
    /// Cancellation kills the child and waits for it to exit, so no
    /// zombie is left behind.
    pub async fn run<F>(&self, cmd: &EncodeCommand, mut on_progress: F) -> MediaResult<()>
    where
        F: FnMut(EncodeProgress) + Send,
    {
        check_ffmpeg()?;

        let args = cmd.build_args();
        debug!("running ffmpeg {}", args.join(" "));

        let mut child = Command::new("ffmpeg")
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stderr = child.stderr.take().expect("stderr not captured");
        let mut lines = BufReader::new(stderr).lines();

        // Stand-in receiver that never fires, so the select arm below can
        // stay unconditional even without a caller-supplied signal.
        let (noop_tx, noop_rx) = watch::channel(false);
        let _noop_tx = noop_tx;
        let mut cancel_rx = self.cancel_rx.clone().unwrap_or_else(|| noop_rx.clone());

        let mut current = EncodeProgress::default();
        let mut tail: VecDeque<String> = VecDeque::with_capacity(STDERR_TAIL_LINES);
        let mut saw_progress = false;
        let stall_deadline = Instant::now() + self.stall_grace;

        loop {
            tokio::select! {
                line = lines.next_line() => match line {
                    Ok(Some(line)) => {
                        if let Some(progress) = parse_progress_line(&line, &mut current) {
                            saw_progress = true;
                            on_progress(progress);
                        } else if is_diagnostic_line(&line) {
                            if tail.len() == STDERR_TAIL_LINES {
                                tail.pop_front();
                            }
                            tail.push_back(line);
                        }
                    }
                    Ok(None) => break,
                    Err(err) => {
                        child.kill().await.ok();
                        return Err(MediaError::Io(err));
                    }
                },
                _ = tokio::time::sleep_until(stall_deadline), if !saw_progress => {
                    warn!(
                        "no progress from ffmpeg within {}s, treating as stalled",
                        self.stall_grace.as_secs()
                    );
                    child.kill().await.ok();
                    return Err(MediaError::Stalled(self.stall_grace.as_secs()));
                }
                changed = cancel_rx.changed() => match changed {
                    Ok(()) if *cancel_rx.borrow() => {
                        child.kill().await.ok();
                        return Err(MediaError::Cancelled);
                    }
                    Ok(()) => {}
                    // Sender gone; fall back to the inert receiver
                    Err(_) => cancel_rx = noop_rx.clone(),
                },
            }
        }

        let status = child.wait().await?;

        if *cancel_rx.borrow() {
            return Err(MediaError::Cancelled);
        }

        if status.success() {
            Ok(())
        } else {
            let stderr_tail = if tail.is_empty() {
                None
            } else {
                Some(tail.into_iter().collect::<Vec<_>>().join("\n"))
            };
            Err(MediaError::encode_failed(
                "ffmpeg exited with non-zero status",
                stderr_tail,
                status.code(),
                exit_signal(&status),
            ))
        }
    }
}

#[cfg(unix)]
fn exit_signal(status: &std::process::ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: &std::process::ExitStatus) -> Option<i32> {
    None
}

/// Parse one line of `-progress` output. Returns a snapshot on each
/// complete record (the `progress=` terminator line).
fn parse_progress_line(line: &str, current: &mut EncodeProgress) -> Option<EncodeProgress> {
    let line = line.trim();

    if let Some((key, value)) = line.split_once('=') {
        match key {
            "out_time_ms" | "out_time_us" => {
                // Both keys report microseconds in modern ffmpeg
                if let Ok(us) = value.parse::<i64>() {
                    current.out_time_ms = us / 1000;
                }
            }
            "frame" => {
                if let Ok(frame) = value.parse() {
                    current.frame = frame;
                }
            }
            "fps" => {
                if let Ok(fps) = value.parse() {
                    current.fps = fps;
                }
            }
            "speed" => {
                // Format: "1.5x" or "N/A"
                if value != "N/A" {
                    if let Some(speed_str) = value.strip_suffix('x') {
                        if let Ok(speed) = speed_str.parse() {
                            current.speed = speed;
                        }
                    }
                }
            }
            "progress" => {
                // "continue" or "end"
                if value == "end" {
                    current.is_complete = true;
                }
                return Some(current.clone());
            }
            _ => {}
        }
    }

    None
}

/// Progress records are `key=value` with bare ASCII keys; anything else is
/// tool diagnostics worth keeping for failure reports.
fn is_diagnostic_line(line: &str) -> bool {
    let line = line.trim();
    if line.is_empty() {
        return false;
    }
    match line.split_once('=') {
        Some((key, _)) => !key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.'),
        None => true,
    }
}
