use log::{debug, warn};
use std::fs;
use std::path::Path;
use thiserror::Error;

use rmsp430_core::{AccessFault, Cpu};

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("unable to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("TI-TXT line {line}: {reason}")]
    Parse { line: usize, reason: &'static str },

    #[error("segment at 0x{addr:05x} does not fit in memory: {source}")]
    Placement {
        addr: u32,
        #[source]
        source: AccessFault,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Raw,
    TiTxt,
}

impl ImageFormat {
    pub fn from_name(name: &str) -> Option<ImageFormat> {
        match name {
            "raw" => Some(ImageFormat::Raw),
            "titxt" => Some(ImageFormat::TiTxt),
            _ => None,
        }
    }

    /// Guess from the file extension, TI-TXT images are usually `.txt`
    pub fn from_path(path: &Path) -> ImageFormat {
        match path.extension().and_then(|e| e.to_str()) {
            Some("txt") => ImageFormat::TiTxt,
            _ => ImageFormat::Raw,
        }
    }
}

/// Contiguous bytes destined for one address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub addr: u32,
    pub data: Vec<u8>,
}

/// Parses TI-TXT: `@ADDR` starts a section, hex byte lines fill it, `q` ends
/// the file
pub fn parse_titxt(text: &str) -> Result<Vec<Segment>, LoadError> {
    let mut segments: Vec<Segment> = Vec::new();

    for (idx, raw) in text.lines().enumerate() {
        let line = idx + 1;
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            continue;
        }
        if trimmed.eq_ignore_ascii_case("q") {
            return Ok(segments);
        }

        if let Some(addr) = trimmed.strip_prefix('@') {
            let addr = u32::from_str_radix(addr.trim(), 16).map_err(|_| LoadError::Parse {
                line,
                reason: "bad section address",
            })?;
            segments.push(Segment {
                addr,
                data: Vec::new(),
            });
            continue;
        }

        let segment = segments.last_mut().ok_or(LoadError::Parse {
            line,
            reason: "data before the first section address",
        })?;
        for byte in trimmed.split_whitespace() {
            if byte.len() != 2 {
                return Err(LoadError::Parse {
                    line,
                    reason: "data must be two-digit hex bytes",
                });
            }
            let value = u8::from_str_radix(byte, 16).map_err(|_| LoadError::Parse {
                line,
                reason: "bad hex byte",
            })?;
            segment.data.push(value);
        }
    }

    warn!("TI-TXT image has no 'q' terminator");
    Ok(segments)
}

/// Reads an image from disk into segments
pub fn load(path: &Path, format: ImageFormat, load_addr: u32) -> Result<Vec<Segment>, LoadError> {
    let io_err = |source| LoadError::Io {
        path: path.display().to_string(),
        source,
    };
    let segments = match format {
        ImageFormat::Raw => vec![Segment {
            addr: load_addr,
            data: fs::read(path).map_err(io_err)?,
        }],
        ImageFormat::TiTxt => parse_titxt(&fs::read_to_string(path).map_err(io_err)?)?,
    };
    for s in segments.iter() {
        debug!("Segment 0x{:05x}: {} bytes", s.addr, s.data.len());
    }
    Ok(segments)
}

/// Copies segments into the CPU's memory, returns the number of bytes placed
pub fn place(cpu: &mut Cpu, segments: &[Segment]) -> Result<usize, LoadError> {
    let mut total = 0;
    for s in segments {
        cpu.write_block(s.addr, &s.data)
            .map_err(|source| LoadError::Placement {
                addr: s.addr,
                source,
            })?;
        total += s.data.len();
    }
    Ok(total)
}

#[cfg(test)]
mod loader_tests {
    use super::*;
    use rmsp430_core::MemoryMap;

    #[test]
    fn parses_sections() {
        let text = "@8000\n31 40 00 30\nB2 40\n@FFFE\n00 80\nq\n";
        let segments = parse_titxt(text).unwrap();
        assert_eq!(
            segments,
            vec![
                Segment {
                    addr: 0x8000,
                    data: vec![0x31, 0x40, 0x00, 0x30, 0xB2, 0x40],
                },
                Segment {
                    addr: 0xFFFE,
                    data: vec![0x00, 0x80],
                },
            ]
        );
    }

    #[test]
    fn stops_at_terminator() {
        let segments = parse_titxt("@2000\r\n01 02\r\nq\r\n@3000\r\nzz\r\n").unwrap();
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].data, vec![1, 2]);
    }

    #[test]
    fn rejects_bad_input() {
        assert!(matches!(
            parse_titxt("01 02\nq\n"),
            Err(LoadError::Parse { line: 1, .. })
        ));
        assert!(matches!(
            parse_titxt("@8000\n01 0G\nq\n"),
            Err(LoadError::Parse { line: 2, .. })
        ));
        assert!(matches!(
            parse_titxt("@80Z0\nq\n"),
            Err(LoadError::Parse { line: 1, .. })
        ));
        assert!(matches!(
            parse_titxt("@8000\n123\nq\n"),
            Err(LoadError::Parse { line: 2, .. })
        ));
    }

    #[test]
    fn placement_into_unmapped_memory_fails() {
        let mut cpu = Cpu::new(MemoryMap::new());
        let segments = parse_titxt("@3000\n00 00\nq\n").unwrap();
        assert!(matches!(
            place(&mut cpu, &segments),
            Err(LoadError::Placement { addr: 0x3000, .. })
        ));

        let segments = parse_titxt("@8000\n03 43\n@FFFE\n00 80\nq\n").unwrap();
        assert_eq!(place(&mut cpu, &segments).unwrap(), 4);
        cpu.reset();
        assert_eq!(cpu.pc(), 0x8000);
    }
}
