//! Command-line interface for the batch transcoder.

use std::path::PathBuf;

use clap::Parser;

use vbatch_models::{template, JobSpec, QualityPreset};

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};

#[derive(Debug, Parser)]
#[command(
    name = "vbatch",
    about = "Batch video transcoder driving an external ffmpeg",
    version
)]
pub struct Args {
    /// Input video files
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    /// Directory for transcoded outputs
    #[arg(short, long, default_value = ".")]
    pub output_dir: PathBuf,

    /// Output container (mp4, mkv, webm, mov)
    #[arg(short, long, default_value = "mp4")]
    pub format: String,

    /// Quality preset (very_low..very_high or 144p..2160p)
    #[arg(short, long, default_value = "medium")]
    pub quality: QualityPreset,

    /// Output naming template, e.g. "{filename}_{quality}_{date}"
    #[arg(short, long, default_value = "{filename}")]
    pub template: String,

    /// Target output size in megabytes (enables two-pass rate control)
    #[arg(long, value_name = "MB")]
    pub target_size: Option<u64>,

    /// Explicit output resolution as WIDTHxHEIGHT, overriding the preset
    #[arg(long, value_name = "WxH")]
    pub resolution: Option<String>,

    /// Number of parallel encodes
    #[arg(short = 'j', long)]
    pub concurrency: Option<usize>,

    /// Overwrite colliding output files instead of auto-renaming
    #[arg(long)]
    pub overwrite: bool,
}

impl Args {
    /// Fold CLI flags over the environment-derived config.
    pub fn apply(&self, config: &mut WorkerConfig) {
        if let Some(concurrency) = self.concurrency {
            config.concurrency = concurrency.max(1);
        }
        if self.overwrite {
            config.overwrite = true;
        }
    }

    /// Build one spec per input, validating the template up front so a
    /// typo fails the run before anything is submitted.
    pub fn job_specs(&self) -> WorkerResult<Vec<JobSpec>> {
        template::validate(&self.template)?;

        let resolution = match self.resolution.as_deref() {
            Some(raw) => Some(parse_resolution(raw)?),
            None => None,
        };

        Ok(self
            .inputs
            .iter()
            .map(|input| {
                let mut spec = JobSpec::new(input.clone(), self.output_dir.clone())
                    .with_template(self.template.clone())
                    .with_format(self.format.clone())
                    .with_quality(self.quality);
                if let Some(mb) = self.target_size {
                    spec = spec.with_target_size(mb * 1024 * 1024);
                }
                if let Some((width, height)) = resolution {
                    spec = spec.with_resolution(width, height);
                }
                spec
            })
            .collect())
    }
}

fn parse_resolution(raw: &str) -> WorkerResult<(u32, u32)> {
    let (width, height) = raw
        .split_once('x')
        .ok_or_else(|| WorkerError::config_error(format!("invalid resolution: {raw}")))?;
    let width = width
        .parse()
        .map_err(|_| WorkerError::config_error(format!("invalid width: {width}")))?;
    let height = height
        .parse()
        .map_err(|_| WorkerError::config_error(format!("invalid height: {height}")))?;
    Ok((width, height))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["vbatch", "clip.mp4"];
        argv.extend_from_slice(extra);
        Args::parse_from(argv)
    }

    #[test]
    fn builds_one_spec_per_input() {
        let args = Args::parse_from(["vbatch", "a.mp4", "b.mkv", "-q", "720p", "-f", "webm"]);
        let specs = args.job_specs().unwrap();
        assert_eq!(specs.len(), 2);
        assert_eq!(specs[0].quality, QualityPreset::P720);
        assert_eq!(specs[1].format, "webm");
    }

    #[test]
    fn target_size_converts_to_bytes() {
        let args = args(&["--target-size", "10"]);
        let specs = args.job_specs().unwrap();
        assert_eq!(specs[0].target_size_bytes, Some(10 * 1024 * 1024));
    }

    #[test]
    fn resolution_parses_or_fails() {
        let ok = args(&["--resolution", "1280x720"]);
        assert_eq!(ok.job_specs().unwrap()[0].resolution, Some((1280, 720)));

        let bad = args(&["--resolution", "wide"]);
        assert!(bad.job_specs().is_err());
    }

    #[test]
    fn bad_template_fails_before_submit() {
        let args = args(&["--template", "{filename}_{bogus}"]);
        assert!(matches!(
            args.job_specs(),
            Err(WorkerError::Template(_))
        ));
    }

    #[test]
    fn flags_override_config() {
        let args = args(&["-j", "6", "--overwrite"]);
        let mut config = WorkerConfig::default();
        args.apply(&mut config);
        assert_eq!(config.concurrency, 6);
        assert!(config.overwrite);
    }
}
