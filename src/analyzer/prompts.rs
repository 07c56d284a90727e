use crate::models::{AnalysisRequest, ExtractedScript};

pub const DEFAULT_MAX_SCRIPT_CHARS: usize = 12_000;

const SYSTEM_PROMPT: &str = r#"You are a Python security expert reviewing a script embedded in a Blender (.blend) file. The script has NOT been run. Identify suspicious or malicious patterns: obfuscated or encoded payloads (base64, zlib, marshal, exec/eval of built strings), network access (urllib, requests, sockets), process spawning (subprocess, os.system, os.popen), file system writes outside the project, persistence (startup scripts, addon registration), credential or clipboard access, and dynamic imports.

Rate the risk from 0 to 10, where 0 means clearly harmless and 10 means clearly malicious. Be strict: the score decides whether the file is safe to open with scripts enabled.

Answer in exactly this format and nothing else:
<Score>single integer 0-10</Score>
<Flags>
one flagged construct per line, e.g. os.system call, base64-decoded exec
(write none if nothing is suspicious)
</Flags>
<Analysis>short plain-text explanation of what the script does and why the flagged constructs matter</Analysis>

Do not repeat the tags. Do not add recommendations."#;

pub struct PromptTemplate {
    max_script_chars: usize,
    max_tokens: Option<u32>,
}

impl PromptTemplate {
    pub fn new(max_script_chars: usize) -> Self {
        Self {
            max_script_chars: max_script_chars.max(1),
            max_tokens: None,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: Option<u32>) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn system_prompt() -> &'static str {
        SYSTEM_PROMPT
    }

    pub fn build_request(&self, script: &ExtractedScript) -> AnalysisRequest {
        let original_chars = script.source_text.chars().count();
        let (body, truncated) = truncate_to_chars(&script.source_text, self.max_script_chars);

        AnalysisRequest {
            script_id: script.id.clone(),
            system_prompt: SYSTEM_PROMPT.to_string(),
            user_prompt: self.build_user_prompt(script, body, truncated, original_chars),
            truncated,
            original_chars,
            max_tokens: self.max_tokens,
        }
    }

    fn build_user_prompt(
        &self,
        script: &ExtractedScript,
        body: &str,
        truncated: bool,
        original_chars: usize,
    ) -> String {
        let truncation_note = if truncated {
            format!(
                "\nNOTE: script truncated from {} to {} characters; judge only what is shown and say so if the cut may hide behavior.\n",
                original_chars, self.max_script_chars
            )
        } else {
            String::new()
        };

        format!(
            r#"TEXT BLOCK: {}
CONTAINER: {}
LENGTH: {} characters
{}
SCRIPT CONTENT:
```python
{}
```"#,
            script.block_name, script.container_name, original_chars, truncation_note, body
        )
    }
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SCRIPT_CHARS)
    }
}

/// Cuts `text` to at most `max_chars` characters on a char boundary.
pub fn truncate_to_chars(text: &str, max_chars: usize) -> (&str, bool) {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => (&text[..idx], true),
        None => (text, false),
    }
}
