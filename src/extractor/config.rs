use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_BLENDER_EXECUTABLE: &str = "blender";
pub const DEFAULT_EXTRACT_TIMEOUT_SECS: u64 = 120;

/// How the extractor executable expects to be called.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExtractorKind {
    /// Headless Blender driven by the bundled helper script.
    Blender,
    /// Any executable honouring `<exe> <container_path> <output_dir>`.
    Generic,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractorConfig {
    pub program: String,
    pub kind: ExtractorKind,
    pub timeout_seconds: u64,
}

impl ExtractorConfig {
    pub fn blender(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            kind: ExtractorKind::Blender,
            timeout_seconds: DEFAULT_EXTRACT_TIMEOUT_SECS,
        }
    }

    pub fn generic(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            kind: ExtractorKind::Generic,
            timeout_seconds: DEFAULT_EXTRACT_TIMEOUT_SECS,
        }
    }

    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout_seconds = seconds;
        self
    }

    /// Argument vector for one extraction. `helper` is only used by Blender.
    pub fn build_args(&self, container: &Path, output_dir: &Path, helper: Option<&Path>) -> Vec<String> {
        let container = container.to_string_lossy().into_owned();
        let output_dir = output_dir.to_string_lossy().into_owned();

        match self.kind {
            ExtractorKind::Generic => vec![container, output_dir],
            ExtractorKind::Blender => {
                let mut args = vec![
                    "--background".to_string(),
                    "--factory-startup".to_string(),
                    "--disable-autoexec".to_string(),
                    "--python-exit-code".to_string(),
                    "1".to_string(),
                ];
                if let Some(helper) = helper {
                    args.push("--python".to_string());
                    args.push(helper.to_string_lossy().into_owned());
                }
                args.push("--".to_string());
                args.push(container);
                args.push(output_dir);
                args
            }
        }
    }

    pub fn get_full_command(&self, container: &Path, output_dir: &Path) -> String {
        let mut cmd = self.program.clone();
        for arg in self.build_args(container, output_dir, Some(Path::new("<helper.py>"))) {
            cmd.push(' ');
            if arg.contains(' ') {
                cmd.push_str(&format!("\"{}\"", arg));
            } else {
                cmd.push_str(&arg);
            }
        }
        cmd
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.program.trim().is_empty() {
            return Err("Extractor executable cannot be empty".to_string());
        }

        if self.timeout_seconds == 0 {
            return Err("Extraction timeout must be greater than 0".to_string());
        }

        Ok(())
    }

    /// Resolves `program` to an executable file, searching `PATH` for bare names.
    pub fn resolve_program(&self) -> Option<PathBuf> {
        resolve_executable(&self.program)
    }
}

pub fn resolve_executable(program: &str) -> Option<PathBuf> {
    let candidate = Path::new(program);
    if candidate.components().count() > 1 || candidate.is_absolute() {
        return is_executable(candidate).then(|| candidate.to_path_buf());
    }

    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var).find_map(|dir| {
        let plain = dir.join(program);
        if is_executable(&plain) {
            return Some(plain);
        }
        let suffix = std::env::consts::EXE_SUFFIX;
        if !suffix.is_empty() {
            let with_suffix = dir.join(format!("{}{}", program, suffix));
            if is_executable(&with_suffix) {
                return Some(with_suffix);
            }
        }
        None
    })
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
