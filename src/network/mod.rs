//! # Network Communication Module
//!
//! TCP links between the controller and its three devices, plus the framing
//! used on every link.
//!
//! ## Framing
//!
//! Messages are JSON objects written back to back. Peers are not required to
//! delimit them, so the receiving side re-splits the byte stream on balanced
//! `{...}` spans, ignoring braces inside JSON strings. Anything between frames
//! (newlines, stray bytes) is skipped.
//!
//! ## Links
//!
//! - One listener per device, bound on the port from [`NetworkConfig`]
//! - A link accepts one peer at a time and re-accepts after a disconnect
//! - Inbound frames are validated into [`Message`]s; invalid ones are logged
//!   and dropped
//! - Outbound messages wait in the device queue while no peer is connected
//!
//! [`NetworkConfig`]: crate::config::NetworkConfig

use crate::error::ValidationError;
use crate::fsm::ControlEvent;
use crate::message::Message;
use crate::types::Device;
use log::{debug, info, warn};
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

/// Largest frame accepted before the pending bytes are discarded.
pub const MAX_MESSAGE_SIZE: usize = 1024 * 1024;

const READ_CHUNK: usize = 4096;

/// Incremental splitter for brace-delimited JSON frames.
///
/// Partial frames are kept across calls to [`FrameSplitter::push`].
///
/// ```rust
/// use mazerunner::network::FrameSplitter;
///
/// let mut splitter = FrameSplitter::new();
/// assert!(splitter.push(br#"{"type":"cmd","#).is_empty());
/// let frames = splitter.push(br#""msg":"mf"}{"type":"cmd","msg":"tl"}"#);
/// assert_eq!(frames.len(), 2);
/// ```
#[derive(Debug, Default)]
pub struct FrameSplitter {
    buffer: Vec<u8>,
    // Scanner state for `buffer[..scanned]`; a held partial frame starts at index 0
    scanned: usize,
    depth: usize,
    in_string: bool,
    escaped: bool,
}

impl FrameSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes held for an incomplete frame.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Append `bytes` and return every frame completed by them.
    ///
    /// Only the new bytes are scanned; the brace depth and string state of a
    /// held partial frame carry over from the previous call.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<Result<String, ValidationError>> {
        self.buffer.extend_from_slice(bytes);
        let mut frames = Vec::new();
        let mut consumed = 0;
        let mut start = 0;

        for i in self.scanned..self.buffer.len() {
            let byte = self.buffer[i];
            if self.in_string {
                if self.escaped {
                    self.escaped = false;
                } else if byte == b'\\' {
                    self.escaped = true;
                } else if byte == b'"' {
                    self.in_string = false;
                }
                continue;
            }
            match byte {
                b'{' => {
                    if self.depth == 0 {
                        start = i;
                    }
                    self.depth += 1;
                }
                b'}' if self.depth > 0 => {
                    self.depth -= 1;
                    if self.depth == 0 {
                        let frame = std::str::from_utf8(&self.buffer[start..=i])
                            .map(str::to_owned)
                            .map_err(|e| ValidationError::MalformedFrame(e.to_string()));
                        frames.push(frame);
                        consumed = i + 1;
                    }
                }
                b'"' if self.depth > 0 => self.in_string = true,
                _ if self.depth == 0 => consumed = i + 1,
                _ => {}
            }
        }
        self.buffer.drain(..consumed);
        self.scanned = self.buffer.len();

        if self.buffer.len() > MAX_MESSAGE_SIZE {
            *self = Self::default();
            frames.push(Err(ValidationError::FrameTooLarge {
                limit: MAX_MESSAGE_SIZE,
            }));
        }
        frames
    }

    /// [`push`](Self::push) followed by message validation.
    pub fn push_messages(&mut self, bytes: &[u8]) -> Vec<Result<Message, ValidationError>> {
        self.push(bytes)
            .into_iter()
            .map(|frame| frame.and_then(|f| Message::from_json(&f)))
            .collect()
    }
}

/// Write one message as a JSON frame.
pub async fn write_frame<W>(writer: &mut W, message: &Message) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut frame = message.to_json();
    frame.push('\n');
    writer.write_all(frame.as_bytes()).await?;
    writer.flush().await
}

/// Connect to `address`, retrying while the peer is not up yet.
pub async fn connect_with_retry(address: &str, attempts: u32, delay: Duration) -> io::Result<TcpStream> {
    let mut attempt = 1;
    loop {
        match TcpStream::connect(address).await {
            Ok(stream) => return Ok(stream),
            Err(err) if attempt < attempts => {
                debug!("connection to {address} failed ({err}), attempt {attempt}/{attempts}");
                attempt += 1;
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Why a single peer session ended.
enum LinkEnd {
    PeerClosed,
    ControllerGone,
}

/// Listening side of one device link.
pub struct DeviceListener {
    device: Device,
    listener: TcpListener,
}

impl DeviceListener {
    pub async fn bind(device: Device, address: &str) -> io::Result<Self> {
        let listener = TcpListener::bind(address).await?;
        info!("{device} link listening on {}", listener.local_addr()?);
        Ok(Self { device, listener })
    }

    pub fn device(&self) -> Device {
        self.device
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serve peers one after another until the controller goes away.
    ///
    /// Inbound messages are tagged with this link's device and sent to
    /// `inbound`; messages from `outbound` are written to the current peer.
    pub async fn serve(
        self,
        inbound: UnboundedSender<ControlEvent>,
        mut outbound: UnboundedReceiver<Message>,
    ) -> io::Result<()> {
        let device = self.device;
        loop {
            let (stream, peer) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(err) => {
                    warn!("{device} link accept failed: {err}");
                    continue;
                }
            };
            info!("{device} connected from {peer}");
            match run_session(device, stream, &inbound, &mut outbound).await {
                Ok(LinkEnd::PeerClosed) => info!("{device} disconnected"),
                Ok(LinkEnd::ControllerGone) => {
                    info!("{device} link closed, controller stopped");
                    return Ok(());
                }
                Err(err) => warn!("{device} link dropped: {err}"),
            }
        }
    }
}

async fn run_session(
    device: Device,
    stream: TcpStream,
    inbound: &UnboundedSender<ControlEvent>,
    outbound: &mut UnboundedReceiver<Message>,
) -> io::Result<LinkEnd> {
    let (mut reader, mut writer) = stream.into_split();
    let mut splitter = FrameSplitter::new();
    let mut buf = vec![0u8; READ_CHUNK];
    loop {
        tokio::select! {
            read = reader.read(&mut buf) => {
                let n = read?;
                if n == 0 {
                    return Ok(LinkEnd::PeerClosed);
                }
                for message in splitter.push_messages(&buf[..n]) {
                    match message {
                        Ok(message) => {
                            debug!("{device} >> {message}");
                            if inbound.send(ControlEvent::Inbound { source: device, message }).is_err() {
                                return Ok(LinkEnd::ControllerGone);
                            }
                        }
                        Err(err) => warn!("{device}: frame dropped: {err}"),
                    }
                }
            }
            next = outbound.recv() => {
                let Some(message) = next else {
                    return Ok(LinkEnd::ControllerGone);
                };
                debug!("{device} << {message}");
                write_frame(&mut writer, &message).await?;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Command;
    use crate::orientation::Action;
    use tokio::sync::mpsc;

    #[test]
    fn splits_concatenated_frames() {
        let mut splitter = FrameSplitter::new();
        let frames = splitter.push(br#"{"type":"cmd","msg":"mf"}{"type":"cmd","msg":"tr"}"#);
        assert_eq!(
            frames,
            vec![
                Ok(r#"{"type":"cmd","msg":"mf"}"#.to_string()),
                Ok(r#"{"type":"cmd","msg":"tr"}"#.to_string()),
            ]
        );
        assert_eq!(splitter.pending(), 0);
    }

    #[test]
    fn keeps_partial_frames_between_reads() {
        let mut splitter = FrameSplitter::new();
        assert!(splitter.push(br#"  {"type":"mapupdate","#).is_empty());
        assert!(splitter.pending() > 0);
        let messages = splitter.push_messages(b"\"msg\":\"-1,-1,0,3,-1\"}\n");
        assert_eq!(messages.len(), 1);
        assert!(matches!(messages[0], Ok(Message::MapUpdate(_))));
        assert_eq!(splitter.pending(), 0);
    }

    #[test]
    fn over_range_readings_are_dropped() {
        let mut splitter = FrameSplitter::new();
        let messages = splitter.push_messages(br#"{"type":"mapupdate","msg":"-1,-1,-1,-1,2147483647"}"#);
        assert_eq!(messages.len(), 1);
        assert!(matches!(messages[0], Err(ValidationError::InvalidPayload { .. })));
    }

    #[test]
    fn byte_by_byte_reads_resume_the_scan() {
        let frame = br#" {"type":"loadmap","msg":"a\"}{b"}"#;
        let mut splitter = FrameSplitter::new();
        let mut frames = Vec::new();
        for byte in frame {
            frames.extend(splitter.push(std::slice::from_ref(byte)));
        }
        assert_eq!(frames, vec![Ok(r#"{"type":"loadmap","msg":"a\"}{b"}"#.to_string())]);
        assert_eq!(splitter.pending(), 0);

        // a frame split inside an escape sequence
        assert!(splitter.push(br#"{"type":"loadmap","msg":"x\"#).is_empty());
        let frames = splitter.push(br#""}"}"#);
        assert_eq!(frames, vec![Ok(r#"{"type":"loadmap","msg":"x\"}"}"#.to_string())]);
    }

    #[test]
    fn braces_inside_strings_do_not_split() {
        let mut splitter = FrameSplitter::new();
        let frames = splitter.push(br#"{"type":"loadmap","msg":"maps/{a}\"}.txt"}"#);
        assert_eq!(frames.len(), 1);
        let frame = frames.into_iter().next().unwrap().unwrap();
        assert_eq!(Message::from_json(&frame).unwrap(), Message::LoadMap("maps/{a}\"}.txt".to_string()));
    }

    #[test]
    fn stray_bytes_between_frames_are_skipped() {
        let mut splitter = FrameSplitter::new();
        let messages = splitter.push_messages(br#"}}noise{"type":"cmd","msg":"sr"}garbage"#);
        assert_eq!(messages, vec![Ok(Message::Command(Command::SensorRequest))]);
        assert_eq!(splitter.pending(), 0);
    }

    #[test]
    fn invalid_frames_surface_as_errors() {
        let mut splitter = FrameSplitter::new();
        let messages = splitter.push_messages(br#"{"type":"cmd","msg":"fly"}{"nope"}"#);
        assert_eq!(messages.len(), 2);
        assert!(messages.iter().all(Result::is_err));
    }

    #[test]
    fn oversized_frame_is_discarded() {
        let mut splitter = FrameSplitter::new();
        let mut huge = br#"{"type":"loadmap","msg":""#.to_vec();
        huge.extend(std::iter::repeat_n(b'a', MAX_MESSAGE_SIZE));
        let frames = splitter.push(&huge);
        assert_eq!(
            frames,
            vec![Err(ValidationError::FrameTooLarge {
                limit: MAX_MESSAGE_SIZE
            })]
        );
        assert_eq!(splitter.pending(), 0);
    }

    #[tokio::test]
    async fn link_forwards_both_directions() {
        let listener = DeviceListener::bind(Device::Pc, "127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let (inbound_tx, mut inbound_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let server = tokio::spawn(listener.serve(inbound_tx, outbound_rx));

        let mut client = connect_with_retry(&address, 5, Duration::from_millis(20)).await.unwrap();
        client.write_all(br#"{"type":"cmd","#).await.unwrap();
        client.write_all(br#""msg":"explore"}{"type":"cmd","msg":"fly"}"#).await.unwrap();
        assert_eq!(
            inbound_rx.recv().await,
            Some(ControlEvent::Inbound {
                source: Device::Pc,
                message: Message::Command(Command::Explore),
            })
        );

        outbound_tx
            .send(Message::RobotMove(Command::Move(Action::TurnLeft)))
            .unwrap();
        let mut splitter = FrameSplitter::new();
        let mut buf = [0u8; 256];
        let received = loop {
            let n = client.read(&mut buf).await.unwrap();
            assert!(n > 0, "link closed early");
            if let Some(message) = splitter.push_messages(&buf[..n]).into_iter().next() {
                break message.unwrap();
            }
        };
        assert_eq!(received, Message::RobotMove(Command::Move(Action::TurnLeft)));

        // the invalid frame never reached the controller
        assert!(inbound_rx.try_recv().is_err());
        server.abort();
    }
}
