use regex::Regex;

/// Sentence-aware splitter measuring chunk size in words.
#[derive(Debug, Clone)]
pub struct Chunker {
    chunk_size: usize,
    chunk_overlap: usize,
    paragraph: Regex,
    terminal: Regex,
}

impl Chunker {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            chunk_overlap: chunk_overlap.min(chunk_size - 1),
            paragraph: Regex::new(r"\n\s*\n").expect("valid regex"),
            terminal: Regex::new(r#"[.!?]+["')\]]*\s+"#).expect("valid regex"),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    pub fn sentences(&self, text: &str) -> Vec<String> {
        let mut sentences = Vec::new();
        let mut push = |raw: &str| {
            let normalized = raw.split_whitespace().collect::<Vec<_>>().join(" ");
            if !normalized.is_empty() {
                sentences.push(normalized);
            }
        };
        for paragraph in self.paragraph.split(text) {
            let mut start = 0;
            for found in self.terminal.find_iter(paragraph) {
                push(&paragraph[start..found.end()]);
                start = found.end();
            }
            push(&paragraph[start..]);
        }
        sentences
    }

    /// Packs sentences into chunks of at most `chunk_size` words, carrying
    /// up to `chunk_overlap` words of trailing sentences into the next chunk.
    pub fn split(&self, text: &str) -> Vec<String> {
        let mut pieces: Vec<(String, usize)> = Vec::new();
        for sentence in self.sentences(text) {
            let words: Vec<&str> = sentence.split_whitespace().collect();
            if words.len() <= self.chunk_size {
                pieces.push((sentence.clone(), words.len()));
            } else {
                for window in words.chunks(self.chunk_size) {
                    pieces.push((window.join(" "), window.len()));
                }
            }
        }

        let mut chunks = Vec::new();
        let mut current: Vec<(String, usize)> = Vec::new();
        let mut current_words = 0;
        for (piece, count) in pieces {
            if current_words + count > self.chunk_size && !current.is_empty() {
                chunks.push(join(&current));

                let mut carried = Vec::new();
                let mut carried_words = 0;
                for (prev, prev_count) in current.iter().rev() {
                    if carried_words + prev_count > self.chunk_overlap
                        || carried_words + prev_count + count > self.chunk_size
                    {
                        break;
                    }
                    carried_words += prev_count;
                    carried.push((prev.clone(), *prev_count));
                }
                carried.reverse();
                current = carried;
                current_words = carried_words;
            }
            current_words += count;
            current.push((piece, count));
        }
        if !current.is_empty() {
            chunks.push(join(&current));
        }
        chunks
    }
}

fn join(pieces: &[(String, usize)]) -> String {
    pieces
        .iter()
        .map(|(text, _)| text.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}
