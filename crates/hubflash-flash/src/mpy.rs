//! MicroPython cross compiler

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::process::Command;

use hubflash_core::firmware::Compiler;

/// Runs an external `mpy-cross` executable
///
/// Different bytecode ABIs need different compiler releases, so a program can
/// be configured per ABI version. Versions without an override use the
/// default program, looked up in `PATH`.
#[derive(Debug, Clone)]
pub struct MpyCross {
    program: PathBuf,
    per_abi: HashMap<u32, PathBuf>,
}

impl Default for MpyCross {
    fn default() -> Self {
        Self {
            program: PathBuf::from("mpy-cross"),
            per_abi: HashMap::new(),
        }
    }
}

impl MpyCross {
    /// Use `program` for every ABI version
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            per_abi: HashMap::new(),
        }
    }

    /// Use `program` for one ABI version
    pub fn with_abi(mut self, abi_version: u32, program: impl Into<PathBuf>) -> Self {
        self.per_abi.insert(abi_version, program.into());
        self
    }

    fn program_for(&self, abi_version: u32) -> &PathBuf {
        self.per_abi.get(&abi_version).unwrap_or(&self.program)
    }
}

impl Compiler for MpyCross {
    fn compile(
        &self,
        script: &str,
        abi_version: u32,
        options: &[String],
    ) -> Result<Vec<u8>, Vec<String>> {
        let dir = tempfile::tempdir().map_err(|e| vec![e.to_string()])?;
        let source = dir.path().join("main.py");
        let output = dir.path().join("main.mpy");
        fs::write(&source, script).map_err(|e| vec![e.to_string()])?;

        let program = self.program_for(abi_version);
        log::debug!("Compiling with {} {:?}", program.display(), options);

        let result = Command::new(program)
            .args(options)
            .arg("-o")
            .arg(&output)
            .arg(&source)
            .output()
            .map_err(|e| vec![format!("failed to run {}: {}", program.display(), e)])?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            let mut lines: Vec<String> = stderr.lines().map(str::to_owned).collect();
            if lines.is_empty() {
                lines.push(format!("{} exited with {}", program.display(), result.status));
            }
            return Err(lines);
        }

        fs::read(&output).map_err(|e| vec![e.to_string()])
    }
}
