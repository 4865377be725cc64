//! Process-backed generator for the `sharp` CLI
//!
//! `sharp predict` processes every image in its input directory, so each
//! call gets its own `input/` holding only the target image.

use crate::config::Config;
use crate::error::{PlygateError, PlygateResult};
use crate::generator::backend::Generator;
use crate::generator::{error_tail, stream_child_output};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::fs;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Generator that shells out to `sharp predict`
#[derive(Debug, Clone)]
pub struct SharpGenerator {
    program: PathBuf,
    checkpoint: PathBuf,
    timeout: Option<Duration>,
}

impl SharpGenerator {
    /// Create a generator for an explicit program and checkpoint
    pub fn new(
        program: impl Into<PathBuf>,
        checkpoint: impl Into<PathBuf>,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            program: program.into(),
            checkpoint: checkpoint.into(),
            timeout,
        }
    }

    /// Create a generator from configuration
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            &config.generator.program,
            config.checkpoint_path(),
            config.generator.timeout(),
        )
    }

    fn display_command(&self, input: &Path, output: &Path) -> String {
        format!(
            "{} predict -i {} -o {} -c {}",
            self.program.display(),
            input.display(),
            output.display(),
            self.checkpoint.display()
        )
    }
}

#[async_trait]
impl Generator for SharpGenerator {
    async fn ensure_ready(&self) -> PlygateResult<()> {
        if !self.checkpoint.is_file() {
            return Err(PlygateError::Bootstrap(format!(
                "model checkpoint missing at {}",
                self.checkpoint.display()
            )));
        }

        Command::new(&self.program)
            .arg("--help")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|e| PlygateError::command_failed(self.program.display().to_string(), e))?;

        Ok(())
    }

    async fn generate(&self, image: &Path, workdir: &Path) -> PlygateResult<PathBuf> {
        let input_dir = workdir.join("input");
        let output_dir = workdir.join("output");
        for dir in [&input_dir, &output_dir] {
            fs::create_dir_all(dir)
                .await
                .map_err(|e| PlygateError::io(format!("creating {}", dir.display()), e))?;
        }

        let file_name = image.file_name().ok_or_else(|| {
            PlygateError::Validation(format!("not a file path: {}", image.display()))
        })?;
        let staged_image = input_dir.join(file_name);
        fs::copy(image, &staged_image).await.map_err(|e| {
            PlygateError::io(format!("copying {} to staging", image.display()), e)
        })?;

        let command = self.display_command(&input_dir, &output_dir);
        info!("Running command: {}", command);

        let mut child = Command::new(&self.program)
            .arg("predict")
            .arg("-i")
            .arg(&input_dir)
            .arg("-o")
            .arg(&output_dir)
            .arg("-c")
            .arg(&self.checkpoint)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| PlygateError::command_failed(command.clone(), e))?;

        let run = async {
            let output = stream_child_output(&mut child, &|line| debug!("sharp: {}", line)).await;
            let status = child.wait().await;
            (output, status)
        };

        let (output, status) = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, run).await {
                Ok(result) => result,
                Err(_) => {
                    warn!("Generator exceeded {}s, killing", limit.as_secs());
                    let _ = child.kill().await;
                    return Err(PlygateError::GenerationTimeout {
                        secs: limit.as_secs(),
                    });
                }
            },
            None => run.await,
        };

        let status = status.map_err(|e| PlygateError::command_failed(command.clone(), e))?;
        if !status.success() {
            return Err(PlygateError::Generation(format!(
                "{} exited with {}:\n{}",
                self.program.display(),
                status,
                error_tail(&output)
            )));
        }

        let stem = Path::new(file_name)
            .file_stem()
            .unwrap_or(file_name)
            .to_string_lossy();
        let expected = output_dir.join(format!("{stem}.ply"));
        if !expected.is_file() {
            return Err(PlygateError::GenerationOutputMissing(expected));
        }

        Ok(expected)
    }

    fn name(&self) -> &'static str {
        "sharp"
    }
}
