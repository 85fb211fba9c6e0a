//! 行単位の読み取り（バッファ上限付き）
//!
//! ## 責務
//!
//! - 改行区切りの入力を 1 行ずつ切り出す
//! - 上限を超えた行をバッファせずに読み捨てる
//!
//! ## 設計ノート
//!
//! `AsyncBufReadExt::lines` は改行が現れるまで無制限にバッファするため、
//! 改行を送らないクライアント 1 つでサーバーのメモリを際限なく消費できて
//! しまいます。このリーダーは `fill_buf` 単位で走査し、上限を超えた時点で
//! 以降のバイトを破棄するため、1 行あたりの保持メモリが上限で頭打ちに
//! なります。

use tokio::io::{self, AsyncBufRead, AsyncBufReadExt};

/// Result of reading one line.
#[derive(Debug, PartialEq, Eq)]
pub enum ReadLine {
    /// A complete line within the cap, newline stripped.
    Line(String),
    /// The line exceeded the cap; its bytes were discarded, not buffered.
    TooLong,
    /// The peer closed the connection.
    Eof,
}

/// Line reader that never holds more than `max_bytes` of one line in memory.
pub struct LineReader<R> {
    reader: R,
    buf: Vec<u8>,
    max_bytes: usize,
}

impl<R: AsyncBufRead + Unpin> LineReader<R> {
    pub fn new(reader: R, max_bytes: usize) -> Self {
        Self {
            reader,
            buf: Vec::new(),
            max_bytes,
        }
    }

    /// Read the next line. An oversized line is consumed up to its newline
    /// and reported as [`ReadLine::TooLong`]; the reader stays usable for
    /// the lines after it.
    pub async fn next_line(&mut self) -> io::Result<ReadLine> {
        self.buf.clear();
        let mut overflowed = false;
        loop {
            let chunk = self.reader.fill_buf().await?;
            if chunk.is_empty() {
                return Ok(if overflowed {
                    ReadLine::TooLong
                } else if self.buf.is_empty() {
                    ReadLine::Eof
                } else {
                    // Final line without a trailing newline.
                    ReadLine::Line(String::from_utf8_lossy(&self.buf).into_owned())
                });
            }
            match chunk.iter().position(|&b| b == b'\n') {
                Some(pos) => {
                    if !overflowed {
                        self.buf.extend_from_slice(&chunk[..pos]);
                    }
                    self.reader.consume(pos + 1);
                    if overflowed || self.buf.len() > self.max_bytes {
                        self.buf.clear();
                        return Ok(ReadLine::TooLong);
                    }
                    return Ok(ReadLine::Line(
                        String::from_utf8_lossy(&self.buf).into_owned(),
                    ));
                }
                None => {
                    let len = chunk.len();
                    if !overflowed {
                        self.buf.extend_from_slice(chunk);
                        if self.buf.len() > self.max_bytes {
                            overflowed = true;
                            self.buf.clear();
                        }
                    }
                    self.reader.consume(len);
                }
            }
        }
    }
}
