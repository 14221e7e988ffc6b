use crate::config::{Config, OutputFormat};
use crate::pipeline::UpscaleJob;
use console::style;
use dialoguer::{Confirm, Input, Select};
use std::fs;
use std::path::{Path, PathBuf};

const SUPPORTED_EXTENSIONS: &[&str] = &[
    "mp4", "mkv", "mov", "webm", // Video
    "wav", "mp3", "flac", "m4a", "ogg", "aac", // Audio
];

pub struct InteractiveResult {
    pub config: Config,
    pub job: UpscaleJob,
}

pub fn run_interactive_wizard() -> anyhow::Result<InteractiveResult> {
    print_header();

    let mut config = Config::load().unwrap_or_default();

    // Step 1: Select source file
    let input = select_source_file()?;

    // Step 2: Output directory
    let output_dir = select_output_dir(&config)?;

    // Step 3: Output format
    let format = select_output_format(config.output_format)?;

    // Step 4: Chunk duration
    let chunk_seconds: f64 = Input::new()
        .with_prompt("Chunk duration in seconds")
        .default(config.chunk_seconds)
        .validate_with(|s: &f64| {
            if s.is_finite() && *s > 0.0 {
                Ok(())
            } else {
                Err("must be a positive number")
            }
        })
        .interact_text()?;

    let mut job = UpscaleJob::new(&input, &config);
    job.output_dir = output_dir;
    job.format = format;
    job.chunk_seconds = chunk_seconds;

    // Step 5: Confirm
    print_summary(&job);

    if !Confirm::new()
        .with_prompt("Proceed with these settings?")
        .default(true)
        .interact()?
    {
        anyhow::bail!("Cancelled by user");
    }

    if job.output_dir != config.output_dir
        && Confirm::new()
            .with_prompt("Remember this output directory?")
            .default(false)
            .interact()?
    {
        config.output_dir = job.output_dir.clone();
        let path = config.save()?;
        println!("{} Saved to {}\n", style("✓").green(), path.display());
    }

    println!();

    Ok(InteractiveResult { config, job })
}

fn print_header() {
    println!();
    println!(
        "{}",
        style("╔═══════════════════════════════════════════════════╗").cyan()
    );
    println!(
        "{}",
        style("║        audiolift - Audio Super-Resolution         ║").cyan()
    );
    println!(
        "{}",
        style("╚═══════════════════════════════════════════════════╝").cyan()
    );
    println!();
}

fn select_source_file() -> anyhow::Result<PathBuf> {
    println!("\n{}", style("Select input audio file:").bold());

    let files = scan_media_files(Path::new("."))?;

    if files.is_empty() {
        println!("  No audio or video files found in current directory.\n");
        return prompt_existing_path();
    }

    let mut items: Vec<String> = files
        .iter()
        .map(|f| {
            let size = fs::metadata(f)
                .map(|m| format_size(m.len()))
                .unwrap_or_else(|_| "?".to_string());
            format!("{} ({})", f.display(), size)
        })
        .collect();
    items.push("Enter custom path...".to_string());

    let selection = Select::new()
        .with_prompt("Choose a file")
        .items(&items)
        .default(0)
        .interact()?;

    if selection == files.len() {
        prompt_existing_path()
    } else {
        Ok(files[selection].clone())
    }
}

fn prompt_existing_path() -> anyhow::Result<PathBuf> {
    let path: String = Input::new()
        .with_prompt("Enter file path")
        .interact_text()?;
    let path = PathBuf::from(path.trim());
    if !path.exists() {
        anyhow::bail!("File not found: {}", path.display());
    }
    Ok(path)
}

fn scan_media_files(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();

        if path.is_file() && is_supported(&path) {
            files.push(path);
        }
    }

    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| SUPPORTED_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
}

fn select_output_dir(config: &Config) -> anyhow::Result<PathBuf> {
    let dir: String = Input::new()
        .with_prompt("Output directory")
        .default(config.output_dir.display().to_string())
        .interact_text()?;
    Ok(PathBuf::from(dir.trim()))
}

fn select_output_format(current: OutputFormat) -> anyhow::Result<OutputFormat> {
    let formats = [
        ("FLAC", "Lossless, compact", OutputFormat::Flac),
        ("WAV", "32-bit float, no FFmpeg needed", OutputFormat::Wav),
    ];

    let items: Vec<String> = formats
        .iter()
        .map(|(name, desc, _)| format!("{} - {}", name, desc))
        .collect();
    let default = formats
        .iter()
        .position(|(_, _, f)| *f == current)
        .unwrap_or(0);

    let selection = Select::new()
        .with_prompt("Select output format")
        .items(&items)
        .default(default)
        .interact()?;

    Ok(formats[selection].2)
}

fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

fn print_summary(job: &UpscaleJob) {
    println!("\n{}", style("═══ Summary ═══").bold());
    println!("  Input:     {}", style(job.input.display()).cyan());
    println!("  Output:    {}", style(job.output_path().display()).cyan());
    println!("  Chunks:    {:.1}s", job.chunk_seconds);
    println!("  Format:    {}", job.format.extension().to_uppercase());
    println!();
}
