use crate::analyzer::prompts::truncate_to_chars;
use crate::error::ScanError;
use crate::models::{AnalysisSummary, ExtractedScript, ParseStatus, RiskLevel, ScriptId, Verdict};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::info;

pub const PREVIEW_MAX_LINES: usize = 80;
pub const PREVIEW_MAX_CHARS: usize = 6000;

const CALIBRATION_NOTE: &str = "Scores are produced by a language model. They are not calibrated across backends or models, and a low score is not proof that a script is safe.";

const STYLE: &str = "body{font-family:system-ui,Segoe UI,Helvetica,Arial,sans-serif;margin:0;line-height:1.45;color:#222}\
header{background:#2c3e50;color:#fff;padding:16px 24px}header h1{margin:0;font-size:1.4em}\
.layout{display:flex}nav{width:240px;flex-shrink:0;padding:16px;background:#f4f6f8;border-right:1px solid #ddd}\
nav ul{list-style:none;padding:0;margin:0}nav li{margin:4px 0}nav a{color:#2c3e50;text-decoration:none}\
main{flex-grow:1;padding:16px 24px}\
.banner{padding:12px 16px;border-radius:6px;margin:12px 0;font-weight:bold}\
.banner.empty{background:#eef3f7;border:1px solid #b8c7d3}\
.banner.abort{background:#fdecea;border:1px solid #e0a39c;color:#8a1c12}\
.banner.cancelled{background:#fff4e5;border:1px solid #f0c36d;color:#7a4b00}\
.banner.inconclusive{background:#f3eefc;border:1px solid #c5b3e6;color:#4b2c85}\
table.overview td{padding:4px 12px 4px 0}\
.script{border:1px solid #ddd;border-radius:6px;margin:16px 0;padding:12px 16px}\
.script.failed{border-style:dashed;background:#fafafa}\
.badge{display:inline-block;padding:2px 8px;border-radius:10px;font-size:.85em;margin-left:8px;color:#fff}\
.badge.info{background:#5d7b91}.badge.low{background:#2e7d32}.badge.medium{background:#b8860b}\
.badge.high{background:#d35400}.badge.critical{background:#c0392b}.badge.unknown{background:#7f8c8d}\
.badge.inconclusive{background:#6c5b7b}\
pre{background:#f6f8fa;padding:12px;overflow:auto;border-radius:4px}\
.note{color:#666;font-size:.9em}footer{padding:16px 24px;color:#666;font-size:.85em;border-top:1px solid #ddd}";

/// Name of the report written for `container`: `report__<stem>.html`.
pub fn report_file_name(container: &Path) -> String {
    let stem = container
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "container".to_string());
    format!("report__{}.html", stem)
}

pub fn html_escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// First `PREVIEW_MAX_LINES` lines, capped at `PREVIEW_MAX_CHARS` characters.
pub fn source_preview(text: &str) -> (String, bool) {
    let mut line_cut = false;
    let mut end = text.len();
    if let Some((idx, _)) = text.match_indices('\n').nth(PREVIEW_MAX_LINES - 1) {
        end = idx;
        line_cut = idx + 1 < text.len();
    }
    let (kept, char_cut) = truncate_to_chars(&text[..end], PREVIEW_MAX_CHARS);
    (kept.to_string(), line_cut || char_cut)
}

/// Renders the self-contained HTML report for one run.
pub struct ReportBuilder {
    flag_threshold: u8,
}

impl ReportBuilder {
    pub fn new(flag_threshold: u8) -> Self {
        Self { flag_threshold }
    }

    pub fn render(
        &self,
        container_name: &str,
        summary: &AnalysisSummary,
        scripts: &[ExtractedScript],
    ) -> String {
        let container = html_escape(container_name);
        let mut s = String::new();

        s.push_str("<!DOCTYPE html>\n<html lang=\"en\"><head><meta charset=\"utf-8\">");
        s.push_str("<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">");
        s.push_str(&format!("<title>Script Analysis Report: {}</title>", container));
        s.push_str(&format!("<style>{}</style>", STYLE));
        s.push_str("</head><body>");
        s.push_str(&format!("<header><h1>Script Analysis Report: {}</h1></header>", container));

        s.push_str("<div class=\"layout\">");
        if !summary.is_empty() {
            s.push_str(&self.render_nav(summary));
        }

        s.push_str("<main>");
        s.push_str(&self.render_banners(container_name, summary));
        if !summary.is_empty() {
            s.push_str(&self.render_overview(summary));

            let by_id: HashMap<&ScriptId, &ExtractedScript> =
                scripts.iter().map(|script| (&script.id, script)).collect();

            s.push_str("<section id=\"per-script\">");
            for (index, verdict) in summary.per_script.iter().enumerate() {
                s.push_str(&self.render_script(index, verdict, by_id.get(&verdict.script_id).copied()));
            }
            s.push_str("</section>");
        }
        s.push_str("</main></div>");

        s.push_str(&format!("<footer>{}</footer>", html_escape(CALIBRATION_NOTE)));
        s.push_str("</body></html>\n");
        s
    }

    /// Writes the report next to the run's extracted scripts, replacing any
    /// earlier report for the same container.
    pub async fn write_report(
        &self,
        output_dir: &Path,
        container: &Path,
        summary: &AnalysisSummary,
        scripts: &[ExtractedScript],
    ) -> Result<PathBuf, ScanError> {
        let container_name = container
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| container.display().to_string());
        let html = self.render(&container_name, summary, scripts);

        tokio::fs::create_dir_all(output_dir).await.map_err(|e| {
            ScanError::Report(format!("cannot create {}: {}", output_dir.display(), e))
        })?;
        let path = output_dir.join(report_file_name(container));
        tokio::fs::write(&path, html)
            .await
            .map_err(|e| ScanError::Report(format!("cannot write {}: {}", path.display(), e)))?;

        info!("Report written to {}", path.display());
        Ok(path)
    }

    fn render_nav(&self, summary: &AnalysisSummary) -> String {
        let mut s = String::from("<nav><h3>Analyzed Scripts</h3><ul>");
        for (index, verdict) in summary.per_script.iter().enumerate() {
            s.push_str(&format!(
                "<li><a href=\"#script-{}\">{}</a> <span class=\"note\">{}</span></li>",
                index,
                html_escape(verdict.script_id.as_str()),
                verdict.risk_score
            ));
        }
        s.push_str("</ul></nav>");
        s
    }

    fn render_banners(&self, container_name: &str, summary: &AnalysisSummary) -> String {
        let mut s = String::new();

        if summary.is_empty() {
            s.push_str(&format!(
                "<div class=\"banner empty\">No scripts found</div><p>No Python text blocks were found embedded in <strong>{}</strong>.</p>",
                html_escape(container_name)
            ));
            return s;
        }

        if let Some(ref abort) = summary.abort {
            s.push_str(&format!(
                "<div class=\"banner abort\">{}</div><p class=\"note\">{}</p>",
                html_escape(abort.headline()),
                html_escape(&abort.message)
            ));
        }
        if summary.cancelled {
            s.push_str("<div class=\"banner cancelled\">Run cancelled</div>");
        }
        if summary.is_inconclusive() {
            s.push_str(
                "<div class=\"banner inconclusive\">Inconclusive: no script was successfully analyzed</div>",
            );
        }
        s
    }

    fn render_overview(&self, summary: &AnalysisSummary) -> String {
        let level = summary
            .overall_risk
            .level()
            .map(|l| l.as_str())
            .unwrap_or("unknown");

        let mut s = String::from("<table class=\"overview\">");
        s.push_str(&format!(
            "<tr><td>Overall risk</td><td><strong>{}</strong><span class=\"badge {}\">{}</span></td></tr>",
            summary.overall_risk, level, level
        ));
        s.push_str(&format!(
            "<tr><td>Flagged scripts</td><td>{} of {} (score above {} or flagged constructs)</td></tr>",
            summary.flagged_count, summary.total_count, self.flag_threshold
        ));
        s.push_str(&format!(
            "<tr><td>Analyzed cleanly</td><td>{} of {}</td></tr>",
            summary.ok_count, summary.total_count
        ));
        if !summary.backend_label.is_empty() {
            s.push_str(&format!(
                "<tr><td>Backend</td><td>{}</td></tr>",
                html_escape(&summary.backend_label)
            ));
        }
        s.push_str("</table>");
        s
    }

    fn render_script(
        &self,
        index: usize,
        verdict: &Verdict,
        script: Option<&ExtractedScript>,
    ) -> String {
        let failed = verdict.parse_status == ParseStatus::Failed;
        let mut s = format!(
            "<article class=\"script{}\" id=\"script-{}\">",
            if failed { " failed" } else { "" },
            index
        );

        let badge = if failed {
            "<span class=\"badge inconclusive\">Inconclusive</span>".to_string()
        } else {
            let level = verdict.risk_score.level().map(|l| l.as_str()).unwrap_or("unknown");
            format!("<span class=\"badge {}\">{}</span>", level, level)
        };
        s.push_str(&format!(
            "<h3 class=\"script-id\">{}{}</h3>",
            html_escape(verdict.script_id.as_str()),
            badge
        ));

        if let Some(script) = script {
            let default_file = format!("{}.py", script.id);
            if script.block_name != default_file && script.block_name != script.id.as_str() {
                s.push_str(&format!(
                    "<p class=\"note\">Text block: {}</p>",
                    html_escape(&script.block_name)
                ));
            }
        }

        s.push_str(&format!(
            "<p>Risk score: <strong>{}</strong> &middot; parse status: {}",
            verdict.risk_score,
            verdict.parse_status.as_str()
        ));
        if !verdict.model_used.is_empty() {
            s.push_str(&format!(
                " &middot; {} ({} ms)",
                html_escape(&verdict.model_used),
                verdict.analysis_duration_ms
            ));
        }
        s.push_str("</p>");

        if verdict.input_truncated {
            s.push_str("<p class=\"note\">The script was truncated before analysis; the verdict covers only the first part.</p>");
        }
        if script.map(|sc| sc.lossy_decoding).unwrap_or(false) {
            s.push_str("<p class=\"note\">The script is not valid UTF-8; invalid bytes were replaced before analysis.</p>");
        }

        if !verdict.flagged_patterns.is_empty() {
            s.push_str("<h4>Flagged patterns</h4><ul>");
            for pattern in &verdict.flagged_patterns {
                s.push_str(&format!("<li>{}</li>", html_escape(pattern)));
            }
            s.push_str("</ul>");
        }

        s.push_str("<h4>Analysis</h4>");
        s.push_str(&format!("<pre>{}</pre>", html_escape(&verdict.rationale_text)));

        if let Some(script) = script {
            let (preview, truncated) = source_preview(&script.source_text);
            s.push_str(&format!(
                "<details><summary>Source ({} lines, {} bytes)</summary><pre>{}</pre>",
                script.line_count(),
                script.byte_size,
                html_escape(&preview)
            ));
            if truncated {
                s.push_str(&format!(
                    "<p class=\"note\">Preview truncated to {} lines / {} characters.</p>",
                    PREVIEW_MAX_LINES, PREVIEW_MAX_CHARS
                ));
            }
            s.push_str("</details>");
        }

        s.push_str("</article>");
        s
    }
}

/// Short terminal summary printed after the report is written.
pub struct ReportFormatter {
    use_colors: bool,
    verbose: bool,
}

impl ReportFormatter {
    pub fn new(use_colors: bool, verbose: bool) -> Self {
        Self { use_colors, verbose }
    }

    pub fn format_run_summary(&self, report_path: &Path, summary: &AnalysisSummary) -> String {
        let mut lines = Vec::new();

        lines.push(self.format_section_title("Blend script analysis"));
        lines.push(format!("Report: {}", report_path.display()));

        if summary.is_empty() {
            lines.push("No scripts found".to_string());
            return lines.join("\n");
        }

        lines.push(self.format_risk(summary));
        lines.push(format!(
            "Flagged: {} of {} script(s), {} analyzed cleanly",
            summary.flagged_count, summary.total_count, summary.ok_count
        ));

        if let Some(ref abort) = summary.abort {
            lines.push(self.paint("\x1b[1m\x1b[31m", abort.headline()));
        }
        if summary.cancelled {
            lines.push(self.paint("\x1b[1m\x1b[33m", "Run cancelled"));
        }
        if summary.is_inconclusive() {
            lines.push(self.paint(
                "\x1b[1m\x1b[35m",
                "Inconclusive: no script was successfully analyzed",
            ));
        }

        if self.verbose {
            for verdict in &summary.per_script {
                lines.push(format!(
                    "  {:>7}  {}  ({})",
                    verdict.risk_score.to_string(),
                    verdict.script_id,
                    verdict.parse_status.as_str()
                ));
            }
        }

        lines.join("\n")
    }

    pub fn format_error(&self, error: &ScanError) -> String {
        self.paint("\x1b[1m\x1b[31m", &format!("Error: {}", error))
    }

    fn format_risk(&self, summary: &AnalysisSummary) -> String {
        let text = format!("Overall risk: {}", summary.overall_risk);
        let color = match summary.overall_risk.level() {
            Some(RiskLevel::Critical) => "\x1b[1m\x1b[31m",
            Some(RiskLevel::High) => "\x1b[1m\x1b[33m",
            Some(RiskLevel::Medium) => "\x1b[1m\x1b[35m",
            Some(RiskLevel::Low) => "\x1b[1m\x1b[32m",
            Some(RiskLevel::Info) => "\x1b[1m\x1b[34m",
            None => "\x1b[1m\x1b[37m",
        };
        self.paint(color, &text)
    }

    fn format_section_title(&self, title: &str) -> String {
        if self.use_colors {
            format!("\x1b[1m\x1b[36m═══ {} ═══\x1b[0m", title)
        } else {
            format!("=== {} ===", title)
        }
    }

    fn paint(&self, color: &str, text: &str) -> String {
        if self.use_colors {
            format!("{}{}\x1b[0m", color, text)
        } else {
            text.to_string()
        }
    }
}
