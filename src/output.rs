use crate::artifacts::RegistryWrite;
use crate::parser::components::ComponentMetadata;

/// Aggregate statistics produced by a one-shot extraction.
#[derive(Debug)]
pub struct ExtractionStats {
    pub file_count: usize,
    pub components: usize,
    pub props: usize,
    /// Components that accept arbitrary keyword props.
    pub open_components: usize,
    /// Files skipped due to read or parse errors.
    pub skipped: usize,
    /// False when an empty scan left the existing registry in place.
    pub registry_written: bool,
    pub elapsed_secs: f64,
}

impl ExtractionStats {
    pub fn new(
        file_count: usize,
        components: &[ComponentMetadata],
        skipped: usize,
        outcome: RegistryWrite,
        elapsed_secs: f64,
    ) -> Self {
        Self {
            file_count,
            components: components.len(),
            props: components.iter().map(|c| c.props.len()).sum(),
            open_components: components
                .iter()
                .filter(|c| c.accepts_arbitrary_props)
                .count(),
            skipped,
            registry_written: matches!(outcome, RegistryWrite::Written { .. }),
            elapsed_secs,
        }
    }
}

/// Print a cargo-style summary of the extraction run to stdout.
///
/// Skipped files and a kept registry are reported on **stderr**.
pub fn print_summary(stats: &ExtractionStats) {
    println!(
        "Scanned {} files in {:.2}s",
        stats.file_count, stats.elapsed_secs
    );
    println!(
        "  {} components, {} props ({} accept arbitrary props)",
        stats.components, stats.props, stats.open_components,
    );

    if !stats.registry_written {
        eprintln!("  no components found; existing registry kept");
    }
    if stats.skipped > 0 {
        eprintln!("  {} files skipped (read or parse errors)", stats.skipped);
    }
}

/// Emit the registry as pretty-printed JSON on stdout.
pub fn print_registry(components: &[ComponentMetadata]) {
    match serde_json::to_string_pretty(components) {
        Ok(s) => println!("{}", s),
        Err(e) => eprintln!("error serialising registry: {}", e),
    }
}
