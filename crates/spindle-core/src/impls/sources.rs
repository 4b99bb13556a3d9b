//! Item sources over iterators, streams, channels and line readers.

use std::pin::Pin;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, Lines};
use tokio::sync::mpsc;

use crate::error::SourceError;
use crate::ports::ItemSource;

/// Wraps an iterator. Infallible; `stop()` drops the iterator.
pub struct IterSource<I> {
    iter: Option<I>,
}

impl<I: Iterator> IterSource<I> {
    pub fn new(items: impl IntoIterator<IntoIter = I>) -> Self {
        Self {
            iter: Some(items.into_iter()),
        }
    }
}

#[async_trait]
impl<I> ItemSource for IterSource<I>
where
    I: Iterator + Send,
    I::Item: Send + 'static,
{
    type Item = I::Item;

    async fn next(&mut self) -> Result<Option<I::Item>, SourceError> {
        Ok(self.iter.as_mut().and_then(Iterator::next))
    }

    fn stop(&mut self) {
        self.iter = None;
    }
}

/// Wraps a fallible `Stream`.
pub struct StreamSource<T> {
    stream: Option<Pin<Box<dyn Stream<Item = Result<T, SourceError>> + Send>>>,
}

impl<T> StreamSource<T> {
    pub fn new(stream: impl Stream<Item = Result<T, SourceError>> + Send + 'static) -> Self {
        Self {
            stream: Some(Box::pin(stream)),
        }
    }
}

#[async_trait]
impl<T: Send + 'static> ItemSource for StreamSource<T> {
    type Item = T;

    async fn next(&mut self) -> Result<Option<T>, SourceError> {
        match self.stream.as_mut() {
            Some(stream) => stream.next().await.transpose(),
            None => Ok(None),
        }
    }

    fn stop(&mut self) {
        self.stream = None;
    }
}

/// Items pushed by another task. Ends when every sender is dropped.
pub struct ChannelSource<T> {
    rx: mpsc::Receiver<T>,
}

impl<T> ChannelSource<T> {
    pub fn new(rx: mpsc::Receiver<T>) -> Self {
        Self { rx }
    }
}

#[async_trait]
impl<T: Send + 'static> ItemSource for ChannelSource<T> {
    type Item = T;

    async fn next(&mut self) -> Result<Option<T>, SourceError> {
        Ok(self.rx.recv().await)
    }

    fn stop(&mut self) {
        // senders see a closed channel from here on
        self.rx.close();
    }
}

/// One item per line of an async reader (stdin, a file, a socket).
pub struct LineSource<R> {
    lines: Option<Lines<R>>,
    skip_blank: bool,
}

impl<R: AsyncBufRead + Unpin> LineSource<R> {
    /// Blank lines are skipped by default.
    pub fn new(reader: R) -> Self {
        Self {
            lines: Some(reader.lines()),
            skip_blank: true,
        }
    }

    pub fn keep_blank_lines(mut self) -> Self {
        self.skip_blank = false;
        self
    }
}

#[async_trait]
impl<R> ItemSource for LineSource<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    type Item = String;

    async fn next(&mut self) -> Result<Option<String>, SourceError> {
        let Some(lines) = self.lines.as_mut() else {
            return Ok(None);
        };
        loop {
            match lines.next_line().await? {
                Some(line) if self.skip_blank && line.trim().is_empty() => continue,
                other => return Ok(other),
            }
        }
    }

    fn stop(&mut self) {
        self.lines = None;
    }
}
