//! Line-framed multiplexing of many result streams over one channel.
//!
//! Every line on the wire belongs to exactly one stream:
//!
//! ```text
//! <index>:DATA:<payload>
//! <index>:END
//! <index>:ERROR:<message>
//! ```
//!
//! A stream emits zero or more `DATA` lines followed by exactly one `END` or `ERROR`.
//! Lines of different streams interleave freely; lines of one stream keep their
//! emission order. Each producer sends whole frames through a shared
//! [`tokio::sync::mpsc`] channel, so a frame is never split by another writer.

use crate::error::{GatewayError, Result};
use crate::reader::{ItemStream, StreamItem};
use bytes::Bytes;
use futures::StreamExt;
use log::{debug, warn};
use std::collections::BTreeMap;
use std::fmt;
use tokio::sync::mpsc;

/// Default number of items buffered before a `DATA` frame is flushed.
pub const DEFAULT_BUFFER_SIZE: usize = 512;

/// Frame kinds of the multiplexing protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    /// A batch of items
    Data,
    /// Successful end of a stream
    End,
    /// Failed end of a stream
    Error,
}

impl FrameType {
    fn as_str(&self) -> &'static str {
        match self {
            FrameType::Data => "DATA",
            FrameType::End => "END",
            FrameType::Error => "ERROR",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value {
            "DATA" => Some(FrameType::Data),
            "END" => Some(FrameType::End),
            "ERROR" => Some(FrameType::Error),
            _ => None,
        }
    }
}

impl fmt::Display for FrameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One line of the multiplexed body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Index of the stream, equal to the position of its query in the batch
    pub stream_index: usize,
    /// Kind of frame
    pub frame_type: FrameType,
    /// Payload; absent for `END`
    pub payload: Option<String>,
}

impl Frame {
    /// `DATA` frame.
    pub fn data(stream_index: usize, payload: String) -> Self {
        Frame {
            stream_index,
            frame_type: FrameType::Data,
            payload: Some(payload),
        }
    }

    /// `END` frame.
    pub fn end(stream_index: usize) -> Self {
        Frame {
            stream_index,
            frame_type: FrameType::End,
            payload: None,
        }
    }

    /// `ERROR` frame; line breaks are removed from the message.
    pub fn error(stream_index: usize, message: &str) -> Self {
        Frame {
            stream_index,
            frame_type: FrameType::Error,
            payload: Some(strip_line_breaks(message)),
        }
    }

    /// Newline-terminated wire form.
    pub fn encode(&self) -> Bytes {
        let line = match &self.payload {
            Some(payload) => format!("{}:{}:{}\n", self.stream_index, self.frame_type, payload),
            None => format!("{}:{}\n", self.stream_index, self.frame_type),
        };
        Bytes::from(line)
    }
}

fn strip_line_breaks(text: &str) -> String {
    text.chars().filter(|c| *c != '\n' && *c != '\r').collect()
}

/// Encodes buffered items into a `DATA` payload.
///
/// Text items are concatenated; structured items become one JSON array.
pub fn encode_batch(items: &[StreamItem]) -> Result<String> {
    match items.first() {
        Some(StreamItem::Text(_)) => {
            let mut payload = String::new();
            for item in items {
                match item {
                    StreamItem::Text(text) => payload.push_str(&strip_line_breaks(text)),
                    StreamItem::Record(value) => payload.push_str(&value.to_string()),
                }
            }
            Ok(payload)
        }
        _ => {
            let values: Vec<&serde_json::Value> = items
                .iter()
                .map(|item| match item {
                    StreamItem::Record(value) => Ok(value),
                    StreamItem::Text(_) => Err(GatewayError::Internal(
                        "Text item in a record stream".to_string(),
                    )),
                })
                .collect::<Result<_>>()?;
            Ok(serde_json::to_string(&values)?)
        }
    }
}

/// Writer side of a multiplexed body.
///
/// Cheap to clone; the body ends once every clone has been dropped.
#[derive(Clone)]
pub struct MultiplexedStreamer {
    sender: mpsc::Sender<Bytes>,
    buffer_size: usize,
}

impl MultiplexedStreamer {
    /// Creates a streamer and the receiver carrying the encoded lines.
    ///
    /// `capacity` bounds the number of frames waiting for the transport.
    pub fn channel(buffer_size: usize, capacity: usize) -> (Self, mpsc::Receiver<Bytes>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (
            MultiplexedStreamer {
                sender,
                buffer_size: buffer_size.max(1),
            },
            receiver,
        )
    }

    /// Items buffered per `DATA` frame.
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    async fn send(&self, frame: Frame) -> bool {
        if self.sender.send(frame.encode()).await.is_err() {
            debug!(
                "Receiver closed, abandoning stream {}",
                frame.stream_index
            );
            return false;
        }
        true
    }

    /// Copies one result stream onto the channel under `stream_index`.
    ///
    /// Items are flushed in `DATA` frames of `buffer_size`, followed by `END`. The
    /// first error ends the stream with a single `ERROR` frame; items still
    /// buffered at that point are discarded. Returns `false` when the receiver went
    /// away before the stream finished.
    pub async fn pipe(&self, stream_index: usize, mut stream: ItemStream) -> bool {
        let mut buffer: Vec<StreamItem> = Vec::with_capacity(self.buffer_size);
        while let Some(item) = stream.next().await {
            let item = match item {
                Ok(item) => item,
                Err(err) => {
                    warn!("Stream {} failed: {}", stream_index, err);
                    return self.send(Frame::error(stream_index, &err.to_string())).await;
                }
            };
            buffer.push(item);
            if buffer.len() >= self.buffer_size && !self.flush(stream_index, &mut buffer).await {
                return false;
            }
        }
        if !buffer.is_empty() && !self.flush(stream_index, &mut buffer).await {
            return false;
        }
        self.send(Frame::end(stream_index)).await
    }

    /// Ends `stream_index` with an `ERROR` frame carrying `message`.
    ///
    /// For producers that died before they could end their own stream. Returns
    /// `false` when the receiver is gone.
    pub async fn fail(&self, stream_index: usize, message: &str) -> bool {
        self.send(Frame::error(stream_index, message)).await
    }

    async fn flush(&self, stream_index: usize, buffer: &mut Vec<StreamItem>) -> bool {
        let frame = match encode_batch(buffer) {
            Ok(payload) => Frame::data(stream_index, payload),
            Err(err) => Frame::error(stream_index, &err.to_string()),
        };
        buffer.clear();
        let terminal = frame.frame_type == FrameType::Error;
        self.send(frame).await && !terminal
    }
}

/// How a demultiplexed stream ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Terminal {
    /// `END` received
    End,
    /// `ERROR` received with this message
    Error(String),
    /// No terminal frame seen
    Missing,
}

/// Reassembled content of one stream index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DemuxedStream {
    /// `DATA` payloads in arrival order
    pub data: Vec<String>,
    /// Terminal frame
    pub terminal: Terminal,
}

impl DemuxedStream {
    fn new() -> Self {
        DemuxedStream {
            data: Vec::new(),
            terminal: Terminal::Missing,
        }
    }

    /// Concatenated text payloads.
    pub fn text(&self) -> String {
        self.data.concat()
    }

    /// Records of all JSON-array payloads, in order.
    pub fn records(&self) -> Result<Vec<serde_json::Value>> {
        let mut records = Vec::new();
        for payload in &self.data {
            let batch: Vec<serde_json::Value> = serde_json::from_str(payload)?;
            records.extend(batch);
        }
        Ok(records)
    }
}

/// Splits a multiplexed body into its streams, keyed by stream index.
///
/// Only indices that appear in the body are present. A stream without a
/// terminal frame comes back with [`Terminal::Missing`].
pub fn parse_multiplexed(body: &str) -> Result<BTreeMap<usize, DemuxedStream>> {
    let mut streams: BTreeMap<usize, DemuxedStream> = BTreeMap::new();
    for line in body.lines() {
        if line.trim().is_empty() {
            continue;
        }
        let malformed = || GatewayError::Format(format!("Malformed multiplexed line: {line}"));
        let (index, rest) = line.split_once(':').ok_or_else(malformed)?;
        let index: usize = index.parse().map_err(|_| malformed())?;
        let (frame_type, payload) = match rest.split_once(':') {
            Some((frame_type, payload)) => (frame_type, Some(payload)),
            None => (rest, None),
        };
        let frame_type = FrameType::parse(frame_type).ok_or_else(malformed)?;
        let stream = streams.entry(index).or_insert_with(DemuxedStream::new);
        match frame_type {
            FrameType::Data => stream.data.push(payload.unwrap_or_default().to_string()),
            FrameType::End => stream.terminal = Terminal::End,
            FrameType::Error => {
                stream.terminal = Terminal::Error(payload.unwrap_or_default().to_string())
            }
        }
    }
    Ok(streams)
}
