//! Parsing of `<binary> models` output.

/// Shape of one line of a backend's model listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelListFormat {
    /// The line is already a model identifier (`anthropic/claude-sonnet-4`).
    Token,
    /// `provider model` pairs, joined as `provider/model`.
    ProviderPair,
}

/// Parse one model identifier per non-empty line.
pub fn parse_model_list(output: &str, format: ModelListFormat) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| match format {
            ModelListFormat::Token => line.split_whitespace().next().map(str::to_string),
            ModelListFormat::ProviderPair => {
                let mut parts = line.split_whitespace();
                match (parts.next(), parts.next()) {
                    (Some(provider), Some(model)) => Some(format!("{provider}/{model}")),
                    (Some(single), None) => Some(single.to_string()),
                    _ => None,
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_lines_are_kept_as_is() {
        let out = "anthropic/claude-sonnet-4\n\n  openai/gpt-5  \n";
        assert_eq!(
            parse_model_list(out, ModelListFormat::Token),
            vec!["anthropic/claude-sonnet-4", "openai/gpt-5"]
        );
    }

    #[test]
    fn provider_pairs_are_joined() {
        let out = "anthropic sonnet-4\nopenai gpt-5\nauto\n";
        assert_eq!(
            parse_model_list(out, ModelListFormat::ProviderPair),
            vec!["anthropic/sonnet-4", "openai/gpt-5", "auto"]
        );
    }
}
