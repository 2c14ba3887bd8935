//! Public API for SDC container operations

use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use tracing::{debug, info, instrument, warn};

use super::engine;
use super::header::ContainerHeader;
use super::integrity;
use super::paths;
use super::policy::{Policy, Severity};
use super::types::*;
use super::utils::{apply_entry_times, container_dir, default_key_path, entry_info, format_filetime};
use crate::error::{IntegrityMismatch, SdcError, SdcResult};

/// Caller-controlled settings for one unpack run
#[derive(Debug, Clone)]
pub struct UnpackOptions {
    pub policy: Policy,
    /// Log per-entry details (paths, timestamps, checksums) at info level
    pub verbose: bool,
    /// Key file, `<container>.key` when unset
    pub key_path: Option<PathBuf>,
    /// Output root, the container's directory when unset
    pub output_dir: Option<PathBuf>,
    /// Also write the decoded header (length-prefixed) here
    pub header_sink: Option<PathBuf>,
    /// Extract entries on the rayon pool
    pub parallel: bool,
    /// Set access/modification times from the entry metadata
    pub preserve_times: bool,
}

impl Default for UnpackOptions {
    fn default() -> Self {
        Self {
            policy: Policy::default(),
            verbose: false,
            key_path: None,
            output_dir: None,
            header_sink: None,
            parallel: false,
            preserve_times: true,
        }
    }
}

/// Everything read and checked before the first entry is written
struct Prepared {
    reader: BufReader<File>,
    key: KeyMaterial,
    header: ContainerHeader,
    structure: StructureReport,
    checksum: ChecksumReport,
    spans: Vec<EntrySpan>,
    names: Vec<EntryName>,
}

/// Load and validate the key file
pub fn load_key(path: &Path) -> SdcResult<KeyMaterial> {
    let bytes = fs::read(path)
        .map_err(|e| SdcError::io(format!("opening key file '{}'", path.display()), e))?;
    let text = String::from_utf8(bytes)
        .map_err(|_| SdcError::KeyFormat(format!("'{}' is not a text file", path.display())))?;
    KeyMaterial::parse(&text)
}

fn enforce(severity: Severity, mismatch: IntegrityMismatch) -> SdcResult<()> {
    match severity {
        Severity::Fatal => Err(mismatch.into()),
        Severity::Advisory => {
            warn!("{mismatch}; continuing anyway");
            Ok(())
        }
    }
}

/// Key, header, structure check, checksum, name table, spans. Nothing is
/// written to disk here.
fn prepare(container: &Path, key_path: &Path, policy: &Policy, verbose: bool) -> SdcResult<Prepared> {
    let key = load_key(key_path)?;

    let file = File::open(container)
        .map_err(|e| SdcError::io(format!("opening SDC file '{}'", container.display()), e))?;
    let mut reader = BufReader::new(file);

    let mut header = ContainerHeader::read(&mut reader, &key)?;

    let structure = header.structure();
    if !structure.fits {
        enforce(
            policy.structure_check,
            IntegrityMismatch::Structure {
                required: structure.required,
                available: structure.available,
            },
        )?;
    }

    let checksum = integrity::verify_checksum(&mut reader, header.data_offset(), key.expected_checksum)?;
    if verbose {
        info!(
            crc32 = format!("0x{:08X}", checksum.computed),
            orig = format!("0x{:08X}", checksum.expected),
            "Checking file integrity"
        );
    }
    if !checksum.matches {
        enforce(
            policy.checksum,
            IntegrityMismatch::Checksum {
                expected: checksum.expected,
                computed: checksum.computed,
            },
        )?;
    }

    header.decrypt_names(&key)?;
    let spans = header.entry_spans()?;
    let names = (0..header.entries.len())
        .map(|index| header.entry_name(index))
        .collect::<SdcResult<Vec<_>>>()?;

    Ok(Prepared {
        reader,
        key,
        header,
        structure,
        checksum,
        spans,
        names,
    })
}

/// List a container's entries without extracting anything.
///
/// Integrity problems are reported in the result rather than failing.
#[instrument(skip(key_path), fields(container = %container.display()))]
pub fn inspect(container: &Path, key_path: Option<&Path>) -> SdcResult<ContainerInfo> {
    let key_path = key_path.map(Path::to_path_buf).unwrap_or_else(|| default_key_path(container));
    let prepared = prepare(container, &key_path, &Policy::forced(), false)?;
    let header = &prepared.header;

    let entries = prepared
        .spans
        .iter()
        .zip(&prepared.names)
        .map(|(span, name)| entry_info(&header.entries[span.index], span, name.to_string()))
        .collect();

    Ok(ContainerInfo {
        path: container.display().to_string(),
        header_size: header.header_size,
        raw_signature: header.raw_signature,
        signature: header.signature,
        entry_count: header.entry_count,
        data_offset: header.data_offset(),
        structure: prepared.structure,
        checksum: prepared.checksum,
        entries,
    })
}

/// Unpack a container next to itself (or into `options.output_dir`)
pub fn unpack(container: &Path, options: &UnpackOptions) -> SdcResult<UnpackReport> {
    unpack_with_progress(container, options, |_| {})
}

/// Unpack with an advisory progress callback
#[instrument(skip(options, on_progress), fields(container = %container.display()))]
pub fn unpack_with_progress<F>(
    container: &Path,
    options: &UnpackOptions,
    mut on_progress: F,
) -> SdcResult<UnpackReport>
where
    F: FnMut(&Progress),
{
    let key_path = options.key_path.clone().unwrap_or_else(|| default_key_path(container));
    let Prepared {
        reader,
        key,
        header,
        structure,
        checksum,
        spans,
        names,
    } = prepare(container, &key_path, &options.policy, options.verbose)?;

    if let Some(sink) = &options.header_sink {
        let mut out = File::create(sink)
            .map_err(|e| SdcError::io(format!("opening header sink '{}'", sink.display()), e))?;
        header
            .write_decoded(&mut out)
            .map_err(|e| SdcError::io(format!("writing header sink '{}'", sink.display()), e))?;
        debug!(sink = %sink.display(), "Decoded header written");
    }

    let root = options.output_dir.clone().unwrap_or_else(|| container_dir(container));
    let xor_mask = key.content_xor_byte();
    let entry_count = spans.len();

    for (span, name) in spans.iter().zip(&names) {
        let entry = &header.entries[span.index];
        if options.verbose {
            info!(
                index = span.index,
                path = %name,
                size = entry.uncompressed_size,
                created = format_filetime(entry.creation_time).unwrap_or_default(),
                accessed = format_filetime(entry.access_time).unwrap_or_default(),
                modified = format_filetime(entry.modification_time).unwrap_or_default(),
                "Entry"
            );
        }
    }

    let settle = |span: &EntrySpan, name: &EntryName, result: SdcResult<(PathBuf, u64)>| {
        settle_entry(&header.entries[span.index], span, name, result, &options.policy, options.preserve_times)
    };

    let mut entries = Vec::with_capacity(entry_count);
    if options.parallel {
        // Collecting into a Result stops handing out entries after the first
        // fatal error; entries already in flight still finish
        let reports: Vec<EntryReport> = spans
            .par_iter()
            .zip(names.par_iter())
            .map(|(span, name)| {
                let file = File::open(container).map_err(|e| {
                    SdcError::io(format!("opening SDC file '{}'", container.display()), e)
                })?;
                let mut reader = BufReader::new(file);
                let result = engine::extract_entry(
                    &mut reader,
                    &root,
                    name,
                    span,
                    header.signature,
                    xor_mask,
                    |_| {},
                );
                settle(span, name, result)
            })
            .collect::<SdcResult<_>>()?;

        for report in reports {
            on_progress(&Progress {
                entry_index: report.index,
                entry_count,
                step: PROGRESS_STEPS,
            });
            entries.push(report);
        }
    } else {
        let mut reader = reader;
        for (span, name) in spans.iter().zip(&names) {
            on_progress(&Progress {
                entry_index: span.index,
                entry_count,
                step: 0,
            });
            let result = engine::extract_entry(
                &mut reader,
                &root,
                name,
                span,
                header.signature,
                xor_mask,
                |step| {
                    on_progress(&Progress {
                        entry_index: span.index,
                        entry_count,
                        step,
                    })
                },
            );
            entries.push(settle(span, name, result)?);
        }
    }

    let report = UnpackReport {
        container: container.display().to_string(),
        output_root: root.display().to_string(),
        header_size: header.header_size,
        signature: header.signature,
        structure,
        checksum,
        entries,
    };
    info!(
        extracted = report.extracted_count(),
        skipped = report.skipped_count(),
        "Unpacking finished"
    );
    Ok(report)
}

/// Turn one entry's outcome into a report line, or abort per policy
fn settle_entry(
    entry: &Entry,
    span: &EntrySpan,
    name: &EntryName,
    result: SdcResult<(PathBuf, u64)>,
    policy: &Policy,
    preserve_times: bool,
) -> SdcResult<EntryReport> {
    match result {
        Ok((path, bytes)) => {
            if preserve_times {
                if let Err(e) = apply_entry_times(&path, entry) {
                    warn!(path = %path.display(), error = %e, "Could not restore file times");
                }
            }
            Ok(EntryReport {
                index: span.index,
                name: name.to_string(),
                path: path.display().to_string(),
                status: EntryStatus::Extracted { bytes },
            })
        }
        Err(e) if !e.is_entry_scoped() => Err(e),
        Err(e) => {
            let severity = match e {
                SdcError::CreateDir { .. } | SdcError::CreateFile { .. } => policy.entry_output,
                _ => policy.truncated_entry,
            };
            if severity.is_fatal() {
                return Err(e);
            }
            warn!(index = span.index, name = %name, error = %e, "Skipping entry");
            Ok(EntryReport {
                index: span.index,
                name: name.to_string(),
                path: paths::translate(name.as_bytes()).relative().display().to_string(),
                status: EntryStatus::Skipped {
                    reason: e.to_string(),
                },
            })
        }
    }
}
