use std::collections::VecDeque;

use super::DocumentError;

const SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

/// Recursive character splitter.
///
/// Text is cut on the coarsest separator it contains (paragraphs, then lines,
/// then words, then single characters). Pieces that fit are packed back
/// together up to `chunk_size` characters, and the tail of each chunk, at most
/// `chunk_overlap` characters long, opens the next one.
#[derive(Debug, Clone)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl TextSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self, DocumentError> {
        if chunk_size == 0 {
            return Err(DocumentError::Splitter("chunk size must be positive".to_string()));
        }
        if chunk_overlap >= chunk_size {
            return Err(DocumentError::Splitter(format!(
                "chunk overlap {} must be smaller than chunk size {}",
                chunk_overlap, chunk_size
            )));
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }

    pub fn split(&self, text: &str) -> Vec<String> {
        self.split_with(text, &SEPARATORS)
    }

    fn split_with(&self, text: &str, separators: &[&str]) -> Vec<String> {
        let mut separator = "";
        let mut finer: &[&str] = &[];
        for (i, candidate) in separators.iter().enumerate() {
            if candidate.is_empty() {
                break;
            }
            if text.contains(candidate) {
                separator = candidate;
                finer = &separators[i + 1..];
                break;
            }
        }

        let pieces: Vec<String> = if separator.is_empty() {
            text.chars().map(String::from).collect()
        } else {
            text.split(separator)
                .filter(|piece| !piece.is_empty())
                .map(String::from)
                .collect()
        };

        let mut chunks = Vec::new();
        let mut fitting = Vec::new();
        for piece in pieces {
            if char_len(&piece) < self.chunk_size {
                fitting.push(piece);
                continue;
            }
            if !fitting.is_empty() {
                chunks.extend(self.merge(&fitting, separator));
                fitting.clear();
            }
            if finer.is_empty() {
                chunks.push(piece);
            } else {
                chunks.extend(self.split_with(&piece, finer));
            }
        }
        if !fitting.is_empty() {
            chunks.extend(self.merge(&fitting, separator));
        }
        chunks
    }

    fn merge(&self, pieces: &[String], separator: &str) -> Vec<String> {
        let separator_len = char_len(separator);
        let mut chunks = Vec::new();
        let mut window: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;

        for piece in pieces {
            let len = char_len(piece);
            let joiner = |window: &VecDeque<&str>| if window.is_empty() { 0 } else { separator_len };

            if total + len + joiner(&window) > self.chunk_size && !window.is_empty() {
                push_joined(&mut chunks, &window, separator);
                while total > self.chunk_overlap
                    || (total + len + joiner(&window) > self.chunk_size && total > 0)
                {
                    match window.pop_front() {
                        Some(first) => {
                            total = total.saturating_sub(char_len(first) + joiner(&window));
                        }
                        None => break,
                    }
                }
            }

            window.push_back(piece.as_str());
            total += len + if window.len() > 1 { separator_len } else { 0 };
        }

        push_joined(&mut chunks, &window, separator);
        chunks
    }
}

fn push_joined(chunks: &mut Vec<String>, window: &VecDeque<&str>, separator: &str) {
    let joined = window.iter().copied().collect::<Vec<_>>().join(separator);
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_text_is_a_single_trimmed_chunk() {
        let splitter = TextSplitter::new(100, 10).unwrap();
        assert_eq!(splitter.split("  Office hours are 9-5.  "), vec!["Office hours are 9-5."]);
    }

    #[test]
    fn test_paragraphs_are_preferred_over_lines() {
        let splitter = TextSplitter::new(7, 0).unwrap();
        let chunks = splitter.split("aaa\n\nbbb\n\nccc");
        assert_eq!(chunks, vec!["aaa", "bbb", "ccc"]);
    }

    #[test]
    fn test_overlap_carries_trailing_words() {
        let splitter = TextSplitter::new(10, 4).unwrap();
        let chunks = splitter.split("one two three four five");
        assert_eq!(chunks, vec!["one two", "two three", "four five"]);
    }

    #[test]
    fn test_long_word_falls_back_to_characters() {
        let splitter = TextSplitter::new(4, 0).unwrap();
        assert_eq!(splitter.split("abcdefghij"), vec!["abcd", "efgh", "ij"]);
    }

    #[test]
    fn test_lengths_are_counted_in_characters() {
        let splitter = TextSplitter::new(2, 0).unwrap();
        assert_eq!(splitter.split("ééééé"), vec!["éé", "éé", "é"]);
    }

    #[test]
    fn test_chunks_never_exceed_chunk_size() {
        let text = "Make-up exams require a medical certificate.\n\
                    Requests go to the department office within one week.\n\n\
                    Recommendation letters need the student name, course name and professor name. \
                    Allow two weeks for processing."
            .repeat(5);
        let splitter = TextSplitter::new(60, 15).unwrap();
        let chunks = splitter.split(&text);
        assert!(chunks.len() > 5);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 60, "chunk too long: {:?}", chunk);
            assert!(!chunk.trim().is_empty());
        }
    }

    #[test]
    fn test_whitespace_only_text_yields_nothing() {
        let splitter = TextSplitter::new(10, 2).unwrap();
        assert!(splitter.split(" \n\n \n ").is_empty());
    }

    #[test]
    fn test_invalid_configuration_is_rejected() {
        assert!(TextSplitter::new(0, 0).is_err());
        assert!(TextSplitter::new(10, 10).is_err());
    }
}
