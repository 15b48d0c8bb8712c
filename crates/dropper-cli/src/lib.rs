use dropper_upload::{RecordState, UploadBatch};

const BAR_WIDTH: usize = 20;

/// Initialize tracing for CLI binaries.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}

/// Truncate a string to max_len characters, appending "..." if truncated.
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// `[#####-----]` for a fraction in `[0.0, 1.0]`.
pub fn progress_bar(fraction: f64, width: usize) -> String {
    let filled = ((fraction.clamp(0.0, 1.0) * width as f64).round() as usize).min(width);
    format!("[{}{}]", "#".repeat(filled), "-".repeat(width - filled))
}

/// One display line per record of the batch.
pub fn render_batch(batch: &UploadBatch) -> Vec<String> {
    batch
        .records()
        .iter()
        .map(|record| {
            let status = match record.state() {
                RecordState::Pending => "pending".to_string(),
                RecordState::Uploading => "uploading".to_string(),
                RecordState::Completed => "done".to_string(),
                RecordState::Failed => match record.error() {
                    Some(error) => format!("failed: {}", error),
                    None => "failed".to_string(),
                },
            };
            format!(
                "{:<30} {} {:>3}%  {}",
                truncate_string(record.file().name(), 30),
                progress_bar(record.progress(), BAR_WIDTH),
                (record.progress() * 100.0).round() as u32,
                status
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use dropper_core::FileHandle;
    use dropper_upload::UploadError;

    #[test]
    fn truncate_string_short() {
        assert_eq!(truncate_string("hello", 10), "hello");
        assert_eq!(truncate_string("", 5), "");
    }

    #[test]
    fn truncate_string_long() {
        assert_eq!(truncate_string("hello world", 8), "hello...");
        assert_eq!(truncate_string("hello", 0), "...");
    }

    #[test]
    fn truncate_string_multibyte() {
        assert_eq!(truncate_string("héllo wörld", 8), "héllo...");
    }

    #[test]
    fn progress_bar_bounds() {
        assert_eq!(progress_bar(0.0, 4), "[----]");
        assert_eq!(progress_bar(0.5, 4), "[##--]");
        assert_eq!(progress_bar(1.0, 4), "[####]");
        assert_eq!(progress_bar(7.0, 4), "[####]");
    }

    #[test]
    fn render_batch_shows_state_per_record() {
        let batch = UploadBatch::new(vec![
            FileHandle::new("a.txt", b"aa".to_vec()),
            FileHandle::new("b.txt", b"bb".to_vec()),
        ]);
        let a = batch.records()[0].id();
        let b = batch.records()[1].id();
        let batch = batch.with_progress(a, Some(1), Some(2)).unwrap();
        let batch = batch.with_error(b, UploadError::new("network lost")).unwrap();

        let lines = render_batch(&batch);
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("a.txt"));
        assert!(lines[0].contains(" 50%"));
        assert!(lines[0].ends_with("uploading"));
        assert!(lines[1].ends_with("failed: network lost"));
    }
}
