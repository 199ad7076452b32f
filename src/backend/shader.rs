// Shader module loading
//
// Vulkan consumes SPIR-V bytecode. Binaries are compiled by build.rs into
// assets/ and read from disk at startup.

use anyhow::{Context, Result};
use ash::vk;
use std::io::Cursor;
use std::path::Path;

use super::Device;
use crate::error::VkResultExt;

const SPIRV_MAGIC: u32 = 0x0723_0203;

/// Decode SPIR-V bytes into words, rejecting anything that is not SPIR-V.
pub fn load_spirv(bytes: &[u8]) -> Result<Vec<u32>> {
    if bytes.is_empty() || bytes.len() % 4 != 0 {
        anyhow::bail!("SPIR-V length {} is not a non-zero multiple of 4", bytes.len());
    }

    // read_spv also fixes up byte order when the magic is swapped
    let words = ash::util::read_spv(&mut Cursor::new(bytes)).context("Failed to read SPIR-V")?;

    if words.first() != Some(&SPIRV_MAGIC) {
        anyhow::bail!("Missing SPIR-V magic number");
    }

    Ok(words)
}

/// Read a SPIR-V file and create a shader module from it
pub fn create_shader_module(device: &Device, path: &Path) -> Result<vk::ShaderModule> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read shader binary {:?}", path))?;
    let code = load_spirv(&bytes).with_context(|| format!("Invalid shader binary {:?}", path))?;

    let create_info = vk::ShaderModuleCreateInfo::builder().code(&code);

    unsafe { device.device.create_shader_module(&create_info, None) }
        .engine_context("Failed to create shader module")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words_to_bytes(words: &[u32]) -> Vec<u8> {
        words.iter().flat_map(|w| w.to_le_bytes()).collect()
    }

    #[test]
    fn accepts_spirv_header() {
        let bytes = words_to_bytes(&[SPIRV_MAGIC, 0x0001_0000, 0, 8, 0]);
        assert_eq!(load_spirv(&bytes).unwrap().len(), 5);
    }

    #[test]
    fn accepts_big_endian_spirv() {
        let bytes: Vec<u8> = [SPIRV_MAGIC, 0x0001_0000]
            .iter()
            .flat_map(|w| w.to_be_bytes())
            .collect();
        assert_eq!(load_spirv(&bytes).unwrap()[0], SPIRV_MAGIC);
    }

    #[test]
    fn rejects_truncated_binary() {
        let mut bytes = words_to_bytes(&[SPIRV_MAGIC, 0x0001_0000]);
        bytes.pop();
        assert!(load_spirv(&bytes).is_err());
        assert!(load_spirv(&[]).is_err());
    }

    #[test]
    fn rejects_non_spirv() {
        assert!(load_spirv(b"#version 450\n\0\0\0").is_err());
    }
}
