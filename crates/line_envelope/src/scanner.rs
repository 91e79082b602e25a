use std::io::{self, ErrorKind, Read};

const CHUNK_SIZE_BYTES: usize = 8192;

/// One step of line scanning over a byte source.
#[derive(Debug)]
pub enum ScannedLine {
    Line {
        line_number: usize,
        bytes: Vec<u8>,
    },
    LineTooLong {
        line_number: usize,
        observed_bytes: usize,
        max_line_bytes: usize,
    },
    IoError {
        line_number: usize,
        source: io::Error,
    },
}

/// Splits a byte source on `\n`, dropping the delimiter and a trailing `\r`.
///
/// A final line without a delimiter is still yielded once. Scanning stops after the first
/// oversized line or I/O failure; both are terminal.
pub struct LineScanner<R: Read> {
    reader: R,
    max_line_bytes: usize,
    buffer: [u8; CHUNK_SIZE_BYTES],
    buffer_pos: usize,
    buffer_len: usize,
    current_line: Vec<u8>,
    line_number: usize,
    done: bool,
}

impl<R: Read> LineScanner<R> {
    pub fn new(reader: R, max_line_bytes: usize) -> Self {
        Self {
            reader,
            max_line_bytes,
            buffer: [0u8; CHUNK_SIZE_BYTES],
            buffer_pos: 0,
            buffer_len: 0,
            current_line: Vec::new(),
            line_number: 0,
            done: false,
        }
    }

    fn fill_buffer(&mut self) -> io::Result<usize> {
        self.buffer_pos = 0;
        self.buffer_len = 0;
        loop {
            match self.reader.read(&mut self.buffer) {
                Ok(n) => {
                    self.buffer_len = n;
                    return Ok(n);
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            }
        }
    }

    fn next_line_number(&mut self) -> usize {
        self.line_number += 1;
        self.line_number
    }

    fn finish_line(&mut self) -> ScannedLine {
        let line_number = self.next_line_number();
        let mut bytes = std::mem::take(&mut self.current_line);
        if bytes.last() == Some(&b'\r') {
            bytes.pop();
        }
        ScannedLine::Line { line_number, bytes }
    }

    fn too_long(&mut self, observed_bytes: usize) -> ScannedLine {
        self.done = true;
        self.current_line.clear();
        ScannedLine::LineTooLong {
            line_number: self.next_line_number(),
            observed_bytes,
            max_line_bytes: self.max_line_bytes,
        }
    }
}

impl<R: Read> Iterator for LineScanner<R> {
    type Item = ScannedLine;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        loop {
            if self.buffer_pos >= self.buffer_len {
                match self.fill_buffer() {
                    Ok(0) => {
                        self.done = true;
                        if !self.current_line.is_empty() {
                            return Some(self.finish_line());
                        }
                        return None;
                    }
                    Ok(_) => {}
                    Err(source) => {
                        self.done = true;
                        let line_number = self.next_line_number();
                        return Some(ScannedLine::IoError {
                            line_number,
                            source,
                        });
                    }
                }
            }

            let slice = &self.buffer[self.buffer_pos..self.buffer_len];
            let newline_idx = slice.iter().position(|b| *b == b'\n');
            let segment_len = newline_idx.unwrap_or(slice.len());

            let observed = self.current_line.len().saturating_add(segment_len);
            if observed > self.max_line_bytes {
                return Some(self.too_long(observed));
            }
            self.current_line.extend_from_slice(&slice[..segment_len]);

            match newline_idx {
                Some(idx) => {
                    self.buffer_pos += idx + 1;
                    return Some(self.finish_line());
                }
                None => self.buffer_pos = self.buffer_len,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn lines(input: &[u8]) -> Vec<Vec<u8>> {
        LineScanner::new(Cursor::new(input.to_vec()), 64)
            .map(|line| match line {
                ScannedLine::Line { bytes, .. } => bytes,
                other => panic!("unexpected scan result: {other:?}"),
            })
            .collect()
    }

    #[test]
    fn final_line_without_delimiter_is_yielded_once() {
        assert_eq!(lines(b"one\ntwo"), vec![b"one".to_vec(), b"two".to_vec()]);
        assert_eq!(lines(b"one\ntwo\n"), vec![b"one".to_vec(), b"two".to_vec()]);
    }

    #[test]
    fn empty_lines_are_kept_and_crlf_is_stripped() {
        assert_eq!(
            lines(b"a\r\n\r\n\nb\r"),
            vec![b"a".to_vec(), Vec::new(), Vec::new(), b"b".to_vec()]
        );
        assert!(lines(b"").is_empty());
    }

    #[test]
    fn oversized_line_stops_scanning() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"ok\n");
        bytes.extend_from_slice(&[b'a'; 50]);
        bytes.extend_from_slice(b"\nnext\n");

        let scanned: Vec<_> = LineScanner::new(Cursor::new(bytes), 16).collect();

        assert_eq!(scanned.len(), 2);
        assert!(matches!(scanned[0], ScannedLine::Line { line_number: 1, .. }));
        assert!(matches!(
            scanned[1],
            ScannedLine::LineTooLong {
                line_number: 2,
                observed_bytes: 50,
                max_line_bytes: 16,
            }
        ));
    }

    #[test]
    fn lines_spanning_chunks_are_reassembled() {
        let long = vec![b'x'; CHUNK_SIZE_BYTES + 10];
        let mut input = long.clone();
        input.push(b'\n');

        let scanned: Vec<_> = LineScanner::new(Cursor::new(input), 64 * 1024).collect();

        assert_eq!(scanned.len(), 1);
        match &scanned[0] {
            ScannedLine::Line { bytes, .. } => assert_eq!(bytes, &long),
            other => panic!("unexpected scan result: {other:?}"),
        }
    }

    #[test]
    fn read_failure_is_terminal() {
        struct Broken;
        impl Read for Broken {
            fn read(&mut self, _: &mut [u8]) -> io::Result<usize> {
                Err(io::Error::new(ErrorKind::Other, "broken pipe in test"))
            }
        }

        let mut scanner = LineScanner::new(Broken, 64);
        match scanner.next() {
            Some(ScannedLine::IoError { line_number, source }) => {
                assert_eq!(line_number, 1);
                assert_eq!(source.to_string(), "broken pipe in test");
            }
            other => panic!("unexpected scan result: {other:?}"),
        }
        assert!(scanner.next().is_none());
    }
}
