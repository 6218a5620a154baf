//! Ready-made classic consumers.

use crate::consumer::ClassicEntityConsumer;
use crate::input_stream::ContentInputStream;

use nio_core::{Charset, ContentType, EntityError, EntityResult};

use std::io::Read;

const CHUNK: usize = 4096;

/// Collects the body into a `Vec<u8>`, optionally bounded.
#[derive(Debug, Clone, Default)]
pub struct BytesConsumer {
    limit: Option<usize>,
}

impl BytesConsumer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail once the body exceeds `limit` bytes.
    pub fn with_limit(limit: usize) -> Self {
        Self { limit: Some(limit) }
    }
}

impl ClassicEntityConsumer for BytesConsumer {
    type Output = Vec<u8>;

    fn consume_data(
        self,
        _content_type: Option<&ContentType>,
        input: &mut ContentInputStream,
    ) -> EntityResult<Vec<u8>> {
        read_body(input, self.limit)
    }
}

/// Collects the body as text, decoded with the declared charset.
#[derive(Debug, Clone)]
pub struct StringConsumer {
    default_charset: Charset,
    limit: Option<usize>,
}

impl Default for StringConsumer {
    fn default() -> Self {
        Self {
            default_charset: Charset::Utf8,
            limit: None,
        }
    }
}

impl StringConsumer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Charset used when the content type declares none.
    pub fn with_default_charset(mut self, charset: Charset) -> Self {
        self.default_charset = charset;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

impl ClassicEntityConsumer for StringConsumer {
    type Output = String;

    fn consume_data(
        self,
        content_type: Option<&ContentType>,
        input: &mut ContentInputStream,
    ) -> EntityResult<String> {
        let charset = content_type
            .and_then(ContentType::charset)
            .unwrap_or(self.default_charset);
        let body = read_body(input, self.limit)?;
        Ok(charset.decode(&body))
    }
}

fn read_body(input: &mut ContentInputStream, limit: Option<usize>) -> EntityResult<Vec<u8>> {
    let mut body = Vec::new();
    let mut chunk = [0u8; CHUNK];
    loop {
        let n = input.read(&mut chunk)?;
        if n == 0 {
            return Ok(body);
        }
        if let Some(limit) = limit {
            if body.len() + n > limit {
                return Err(EntityError::Consumer(format!(
                    "entity content exceeds {} bytes",
                    limit
                )));
            }
        }
        body.extend_from_slice(&chunk[..n]);
    }
}
