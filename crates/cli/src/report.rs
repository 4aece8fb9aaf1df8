use archive_pipeline::BatchSummary;

pub fn render_summary(summary: &BatchSummary) -> String {
    let width = summary
        .totals
        .iter()
        .map(|t| t.metric.len())
        .max()
        .unwrap_or(0);

    let mut out = String::new();
    out.push_str(&format!(
        "{} finished in {} ms ({} files read, {} skipped, peak readers {}/{})\n",
        summary.pipeline,
        summary.time_ms,
        summary.files_processed,
        summary.files_skipped,
        summary.pool.peak,
        summary.pool.limit
    ));
    for total in &summary.totals {
        out.push_str(&format!(
            "{:<width$}  {:>12}\n",
            total.metric,
            total.total,
            width = width
        ));
    }
    out.trim_end().to_string()
}
