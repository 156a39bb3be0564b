//! Size reports for function bundles.

use lambdapack_layer::PseudoLayer;
use std::collections::BTreeMap;
use std::io::Write;
use tabwriter::TabWriter;
use tracing::warn;

use crate::{Budget, Error, LambdaGroup, KIB};

const LARGE_COMPRESSED: u64 = 100 * KIB;
const LARGE_UNCOMPRESSED: u64 = 500 * KIB;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SizeEntry {
    /// The first three segments of the paths aggregated here.
    pub name: String,
    pub compressed: u64,
    pub uncompressed: u64,
}

impl SizeEntry {
    pub fn is_large(&self) -> bool {
        self.compressed >= LARGE_COMPRESSED || self.uncompressed >= LARGE_UNCOMPRESSED
    }
}

/// Sizes of one group, aggregated per dependency folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SizeBreakdown {
    pub pages: Vec<String>,
    /// Sorted by compressed size, largest first.
    pub entries: Vec<SizeEntry>,
    pub compressed: u64,
    pub uncompressed: u64,
}

impl SizeBreakdown {
    pub fn of(group: &LambdaGroup, initial: &PseudoLayer) -> Self {
        let mut folders: BTreeMap<String, (u64, u64)> = BTreeMap::new();
        for (path, file) in initial.iter().chain(group.layer.iter()) {
            if file.is_symlink() {
                continue;
            }
            let folder = path.split('/').take(3).collect::<Vec<_>>().join("/");
            let sizes = folders.entry(folder).or_default();
            sizes.0 += file.compressed_size();
            sizes.1 += file.uncompressed_size();
        }

        let mut entries: Vec<_> = folders
            .into_iter()
            .map(|(name, (compressed, uncompressed))| SizeEntry {
                name,
                compressed,
                uncompressed,
            })
            .collect();
        entries.sort_by(|a, b| b.compressed.cmp(&a.compressed).then(a.name.cmp(&b.name)));

        Self {
            pages: group.pages.clone(),
            compressed: entries.iter().map(|e| e.compressed).sum(),
            uncompressed: entries.iter().map(|e| e.uncompressed).sum(),
            entries,
        }
    }

    pub fn large_entries(&self) -> impl Iterator<Item = &SizeEntry> {
        self.entries.iter().filter(|e| e.is_large())
    }

    pub fn write_table<W: Write>(&self, w: W) -> std::io::Result<()> {
        let mut tw = TabWriter::new(w).padding(2);

        writeln!(
            tw,
            "Serverless Function's page{}: {}",
            if self.pages.len() == 1 { "" } else { "s" },
            self.pages.join(", ")
        )?;
        writeln!(tw, "Large Dependencies\tUncompressed size\tCompressed size")?;

        let mut large = 0;
        for entry in self.large_entries() {
            writeln!(
                tw,
                "{}\t{}\t{}",
                entry.name,
                pretty_bytes(entry.uncompressed),
                pretty_bytes(entry.compressed)
            )?;
            large += 1;
        }
        if large == 0 {
            writeln!(tw, "No large dependencies found (> 100KB compressed)")?;
        }

        writeln!(tw)?;
        writeln!(
            tw,
            "All dependencies\t{}\t{}",
            pretty_bytes(self.uncompressed),
            pretty_bytes(self.compressed)
        )?;
        tw.flush()
    }
}

pub fn pretty_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["kB", "MB", "GB", "TB"];
    if bytes < 1000 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64;
    let mut unit = "B";
    for u in UNITS {
        if value < 1000.0 {
            break;
        }
        value /= 1000.0;
        unit = u;
    }
    format!("{value:.2} {unit}")
}

/// Checks every group against `budget`.
///
/// Groups above `warning_ratio` of a limit are reported and let through.
/// Groups over a limit have their breakdown written to `out` before the
/// build fails with [Error::LambdaSizeExceeded].
pub fn check_sizes(
    groups: &[LambdaGroup],
    initial: &PseudoLayer,
    budget: &Budget,
    warning_ratio: f64,
    out: &mut dyn Write,
) -> Result<(), Error> {
    let mut exceeded = Vec::new();

    for group in groups {
        let (compressed, uncompressed) = (group.compressed_bytes, group.uncompressed_bytes);
        if budget.is_exceeded_by(compressed, uncompressed) {
            exceeded.push(group);
            continue;
        }

        let approaching = compressed as f64 >= budget.compressed_limit() as f64 * warning_ratio
            || uncompressed as f64 >= budget.uncompressed_limit() as f64 * warning_ratio;
        if approaching {
            warn!(
                pages = %group.pages.join(", "),
                compressed,
                uncompressed,
                "serverless function is approaching the size limit"
            );
            write_breakdown(group, initial, out);
        }
    }

    if exceeded.is_empty() {
        return Ok(());
    }

    for group in &exceeded {
        write_breakdown(group, initial, out);
    }
    Err(Error::LambdaSizeExceeded {
        pages: exceeded.iter().map(|g| g.pages.clone()).collect(),
        compressed_limit: budget.compressed_limit(),
        uncompressed_limit: budget.uncompressed_limit(),
    })
}

fn write_breakdown(group: &LambdaGroup, initial: &PseudoLayer, out: &mut dyn Write) {
    if let Err(e) = SizeBreakdown::of(group, initial).write_table(&mut *out) {
        warn!(err = %e, "unable to write size breakdown");
    }
}
