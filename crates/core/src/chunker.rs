use crate::error::PipelineError;

/// Fragment sizing for the semantic retrieval pipeline, measured in
/// characters. Overlap must stay strictly below the maximum so every
/// fragment makes forward progress.
#[derive(Debug, Clone, Copy)]
pub struct ChunkingConfig {
    pub max_chars: usize,
    pub overlap_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chars: 1_000,
            overlap_chars: 200,
        }
    }
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.max_chars == 0 {
            return Err(PipelineError::InvalidConfiguration(
                "max_chars must be greater than zero".to_string(),
            ));
        }
        if self.overlap_chars >= self.max_chars {
            return Err(PipelineError::InvalidConfiguration(format!(
                "overlap_chars {} must be smaller than max_chars {}",
                self.overlap_chars, self.max_chars
            )));
        }
        Ok(())
    }

    /// Characters between successive fragment start positions.
    pub fn stride(&self) -> usize {
        self.max_chars - self.overlap_chars
    }
}

/// Lazy left-to-right fragment iterator over `text`. Fragment *i+1*
/// begins `stride()` characters after fragment *i*; the trailing
/// remainder is emitted as a final shorter fragment. Never yields an
/// empty fragment.
#[derive(Debug, Clone)]
pub struct Fragments<'a> {
    text: &'a str,
    byte_pos: usize,
    config: ChunkingConfig,
}

impl<'a> Iterator for Fragments<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        if self.byte_pos >= self.text.len() {
            return None;
        }

        let rest = &self.text[self.byte_pos..];
        let mut end = rest.len();
        let mut stride_offset = None;

        for (count, (offset, _)) in rest.char_indices().enumerate() {
            if count == self.config.stride() {
                stride_offset = Some(offset);
            }
            if count == self.config.max_chars {
                end = offset;
                break;
            }
        }

        let fragment = &rest[..end];

        if end == rest.len() {
            // Final fragment; the iterator is exhausted.
            self.byte_pos = self.text.len();
        } else if let Some(offset) = stride_offset {
            self.byte_pos += offset;
        } else {
            self.byte_pos = self.text.len();
        }

        Some(fragment)
    }
}

/// Validate `config` and return a restartable fragment iterator.
pub fn fragments(text: &str, config: ChunkingConfig) -> Result<Fragments<'_>, PipelineError> {
    config.validate()?;
    Ok(Fragments {
        text,
        byte_pos: 0,
        config,
    })
}
