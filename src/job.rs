//! SLURM batch script rendering and submission for the training job.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result, anyhow, bail};
use tracing::info;

use crate::config::JobConfig;

/// Render the batch script that installs dependencies and launches the
/// training entry point against `data_dir`.
pub fn render_batch_script(cfg: &JobConfig, data_dir: &Path) -> Result<String> {
    let mut script = String::new();
    writeln!(script, "#!/bin/bash")?;

    let mut directive = |flag: &str, value: Option<String>| -> Result<()> {
        if let Some(value) = value {
            if value.is_empty() || value.chars().any(char::is_whitespace) {
                bail!("#SBATCH --{flag} value {value:?} must be non-empty without whitespace");
            }
            writeln!(script, "#SBATCH --{flag}={value}")?;
        }
        Ok(())
    };

    directive("job-name", Some(cfg.name.clone()))?;
    directive("account", cfg.account.clone())?;
    directive("partition", cfg.partition.clone())?;
    directive("time", Some(cfg.time.clone()))?;
    directive("nodes", Some(cfg.nodes.to_string()))?;
    directive("ntasks-per-node", Some(cfg.tasks_per_node().to_string()))?;
    let gres = match &cfg.gpu_type {
        Some(kind) => format!("gpu:{kind}:{}", cfg.gpus_per_node),
        None => format!("gpu:{}", cfg.gpus_per_node),
    };
    directive("gres", Some(gres))?;
    directive("cpus-per-task", Some(cfg.cpus_per_task.to_string()))?;
    directive("mem", cfg.mem.clone())?;
    directive("output", cfg.output.clone())?;

    writeln!(script)?;
    writeln!(script, "set -euo pipefail")?;
    writeln!(script)?;

    for module in &cfg.modules {
        writeln!(script, "module load {}", shell_quote(module))?;
    }
    for line in &cfg.setup {
        writeln!(script, "{line}")?;
    }
    if let Some(requirements) = &cfg.requirements {
        writeln!(
            script,
            "pip install -r {}",
            shell_quote(&requirements.to_string_lossy())
        )?;
    }
    if !cfg.modules.is_empty() || !cfg.setup.is_empty() || cfg.requirements.is_some() {
        writeln!(script)?;
    }

    let command = training_command(cfg, data_dir)?;
    writeln!(script, "srun {}", command.join(" \\\n    "))?;

    Ok(script)
}

/// Launcher, entry point and flags as individually quoted shell words,
/// grouped so each flag stays next to its value.
pub fn training_command(cfg: &JobConfig, data_dir: &Path) -> Result<Vec<String>> {
    validate_flag(&cfg.data_flag)?;
    let mut words = vec![format!(
        "{} {}",
        shell_quote(&cfg.launcher),
        shell_quote(&cfg.entry_point)
    )];
    words.push(format!(
        "--{} {}",
        cfg.data_flag,
        shell_quote(&data_dir.to_string_lossy())
    ));

    for (key, value) in &cfg.hyperparameters {
        validate_flag(key)?;
        if let Some(word) = render_flag(key, value)? {
            words.push(word);
        }
    }
    Ok(words)
}

fn render_flag(key: &str, value: &toml::Value) -> Result<Option<String>> {
    let rendered = match value {
        toml::Value::Boolean(true) => return Ok(Some(format!("--{key}"))),
        toml::Value::Boolean(false) => return Ok(None),
        toml::Value::Array(items) => {
            if items.is_empty() {
                return Ok(None);
            }
            items
                .iter()
                .map(|item| render_scalar(key, item))
                .collect::<Result<Vec<_>>>()?
                .join(" ")
        }
        other => render_scalar(key, other)?,
    };
    Ok(Some(format!("--{key} {rendered}")))
}

fn render_scalar(key: &str, value: &toml::Value) -> Result<String> {
    let text = match value {
        toml::Value::String(s) => s.clone(),
        toml::Value::Integer(i) => i.to_string(),
        toml::Value::Float(f) => f.to_string(),
        toml::Value::Boolean(b) => b.to_string(),
        toml::Value::Datetime(dt) => dt.to_string(),
        toml::Value::Array(_) | toml::Value::Table(_) => {
            bail!("hyperparameter `{key}` must be a scalar or a flat array")
        }
    };
    Ok(shell_quote(&text))
}

fn validate_flag(key: &str) -> Result<()> {
    let valid = !key.is_empty()
        && key
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '-');
    if valid {
        Ok(())
    } else {
        Err(anyhow!("invalid flag name {key:?}"))
    }
}

/// Quote `word` for a POSIX shell when it contains anything beyond a
/// conservative safe set.
pub fn shell_quote(word: &str) -> String {
    let safe = !word.is_empty()
        && word.chars().all(|ch| {
            ch.is_ascii_alphanumeric()
                || matches!(ch, '_' | '-' | '.' | '/' | ':' | ',' | '=' | '+' | '@' | '%')
        });
    if safe {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', "'\\''"))
    }
}

pub fn write_batch_script(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
    }
    fs::write(path, contents).with_context(|| format!("failed to write {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o755))
            .with_context(|| format!("failed to mark {} executable", path.display()))?;
    }
    Ok(())
}

/// Hands a rendered batch script to a scheduler and returns the job id.
pub trait Submitter {
    fn submit(&self, script: &Path) -> Result<String>;
}

#[derive(Debug, Clone)]
pub struct SbatchSubmitter {
    binary: PathBuf,
}

impl Default for SbatchSubmitter {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("sbatch"),
        }
    }
}

impl SbatchSubmitter {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl Submitter for SbatchSubmitter {
    fn submit(&self, script: &Path) -> Result<String> {
        let output = Command::new(&self.binary)
            .arg(script)
            .output()
            .with_context(|| format!("failed to launch {}", self.binary.display()))?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("sbatch exited with {}: {}", output.status, stderr.trim());
        }
        let job_id = parse_job_id(&stdout)
            .ok_or_else(|| anyhow!("unrecognized sbatch output: {}", stdout.trim()))?;
        info!("submitted {} as job {job_id}", script.display());
        Ok(job_id)
    }
}

/// Extract the job id from `sbatch` output, either the default
/// `Submitted batch job <id>` line or `--parsable` `<id>[;cluster]`.
pub fn parse_job_id(stdout: &str) -> Option<String> {
    for line in stdout.lines() {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix("Submitted batch job") {
            let id = rest.split_whitespace().next()?;
            return Some(id.to_string());
        }
        let candidate = line.split(';').next().unwrap_or_default();
        if !candidate.is_empty() && candidate.chars().all(|ch| ch.is_ascii_digit()) {
            return Some(candidate.to_string());
        }
    }
    None
}
