//! MicroPython compiler interface

/// MicroPython bytecode ABI versions that can be embedded
pub const SUPPORTED_MPY_ABI: [u32; 2] = [5, 6];

/// Compiles a Python script to MicroPython bytecode
pub trait Compiler {
    /// Compile `script` for the given bytecode ABI
    ///
    /// On failure returns the compiler's error output, one entry per line.
    fn compile(
        &self,
        script: &str,
        abi_version: u32,
        options: &[String],
    ) -> Result<Vec<u8>, Vec<String>>;
}

impl<F> Compiler for F
where
    F: Fn(&str, u32, &[String]) -> Result<Vec<u8>, Vec<String>>,
{
    fn compile(
        &self,
        script: &str,
        abi_version: u32,
        options: &[String],
    ) -> Result<Vec<u8>, Vec<String>> {
        self(script, abi_version, options)
    }
}
