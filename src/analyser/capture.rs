//! Splits a capture into TCP sessions, one window of `tcp.stream` ids at a time.
//!
//! tshark is run once per window with a display filter restricting it to that id
//! range, so only one window's packets are ever held in memory.
use std::collections::BTreeMap;
use std::vec;
use crate::config::ExtractConfig;
use crate::error::{Error, Result};
use super::containers::{Packet, Session};

/// Half-open range of connection ids `[start, start + size)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SliceWindow {
    pub start: u64,
    pub size: u64,
}

impl SliceWindow {
    pub fn new(start: u64, size: u64) -> Self {
        Self { start, size }
    }

    pub fn end(&self) -> u64 {
        self.start + self.size
    }

    pub fn contains(&self, stream: u64) -> bool {
        stream >= self.start && stream < self.end()
    }

    /// The window directly after this one.
    pub fn following(&self) -> Self {
        Self::new(self.end(), self.size)
    }

    pub fn display_filter(&self) -> String {
        format!("tcp.stream >= {} and tcp.stream < {}", self.start, self.end())
    }
}

/// Source of decoded packets for one window of connection ids.
pub trait SliceDecoder {
    fn decode(&mut self, window: &SliceWindow) -> Result<Vec<Packet>>;
}

/// Decodes windows by spawning tshark through rtshark.
pub struct TsharkDecoder {
    capture_path: String,
}

impl TsharkDecoder {
    pub fn new(capture_path: &str) -> Result<Self> {
        if !std::path::Path::new(capture_path).is_file() {
            return Err(Error::CaptureNotFound {
                path: capture_path.to_string(),
            });
        }
        log::info!("Loading {capture_path}");
        Ok(Self {
            capture_path: capture_path.to_string(),
        })
    }
}

impl SliceDecoder for TsharkDecoder {
    fn decode(&mut self, window: &SliceWindow) -> Result<Vec<Packet>> {
        let filter = window.display_filter();

        let builder = rtshark::RTSharkBuilder::builder()
            .input_path(&self.capture_path)
            .display_filter(&filter);

        let mut rtshark = builder.spawn().map_err(|err| Error::Decode {
            filter: filter.clone(),
            reason: format!("could not spawn tshark: {err}"),
        })?;

        let mut packets = Vec::new();
        loop {
            match rtshark.read() {
                Ok(Some(packet)) => packets.push(Packet::from(&packet)),
                Ok(None) => break,
                Err(err) => {
                    rtshark.kill();
                    return Err(Error::Decode {
                        filter,
                        reason: err.to_string(),
                    });
                }
            }
        }
        rtshark.kill();

        Ok(packets)
    }
}

/// Forward-only iterator over `(session_index, Session)`.
///
/// `session_index` counts sessions across all windows. A window whose decode
/// fails contributes no sessions; the next window is tried. A window that decodes
/// cleanly but holds no packets marks the end of the capture.
pub struct CaptureSegmenter<D> {
    decoder: D,
    slice_size: u64,
    max_slices: Option<usize>,
    max_consecutive_failures: usize,
    next_window: SliceWindow,
    current: vec::IntoIter<Session>,
    session_index: usize,
    slices_decoded: usize,
    failed_slices: usize,
    consecutive_failures: usize,
    exhausted: bool,
}

impl<D: SliceDecoder> CaptureSegmenter<D> {
    pub fn new(decoder: D, config: &ExtractConfig) -> Self {
        let slice_size = config.slice_size.max(1);
        Self {
            decoder,
            slice_size,
            max_slices: config.max_slices,
            max_consecutive_failures: config.max_consecutive_failures.max(1),
            next_window: SliceWindow::new(0, slice_size),
            current: Vec::new().into_iter(),
            session_index: 0,
            slices_decoded: 0,
            failed_slices: 0,
            consecutive_failures: 0,
            exhausted: false,
        }
    }

    pub fn slice_size(&self) -> u64 {
        self.slice_size
    }

    /// Windows handed to the decoder so far, failed ones included.
    pub fn slices_decoded(&self) -> usize {
        self.slices_decoded
    }

    pub fn failed_slices(&self) -> usize {
        self.failed_slices
    }

    fn load_next_slice(&mut self) {
        if self.max_slices.map_or(false, |max| self.slices_decoded >= max) {
            log::info!("Reached the limit of {} slices", self.slices_decoded);
            self.exhausted = true;
            return;
        }

        let window = self.next_window;
        self.next_window = window.following();
        self.slices_decoded += 1;
        log::info!("Processing {}", window.display_filter());

        match self.decoder.decode(&window) {
            Ok(packets) if packets.is_empty() => {
                log::info!("No packets in {}, capture exhausted", window.display_filter());
                self.exhausted = true;
            }
            Ok(packets) => {
                self.consecutive_failures = 0;
                let sessions = splice_sessions(&window, packets);
                log::debug!("Slice starting at {} holds {} sessions", window.start, sessions.len());
                self.current = sessions.into_iter();
            }
            Err(err) => {
                log::warn!("{err}. Treating streams {}..{} as empty.", window.start, window.end());
                self.failed_slices += 1;
                self.consecutive_failures += 1;
                if self.consecutive_failures >= self.max_consecutive_failures {
                    log::warn!(
                        "Giving up after {} consecutive failed slices",
                        self.consecutive_failures
                    );
                    self.exhausted = true;
                }
            }
        }
    }
}

impl<D: SliceDecoder> Iterator for CaptureSegmenter<D> {
    type Item = (usize, Session);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(session) = self.current.next() {
                let index = self.session_index;
                self.session_index += 1;
                return Some((index, session));
            }
            if self.exhausted {
                return None;
            }
            self.load_next_slice();
        }
    }
}

/// Buckets a window's packets by `tcp.stream`, keeping capture order inside each
/// bucket and emitting buckets in connection-id order.
///
/// Packets without a TCP layer, or outside the window, are dropped.
pub fn splice_sessions(window: &SliceWindow, packets: Vec<Packet>) -> Vec<Session> {
    let mut buckets: BTreeMap<u64, Session> = BTreeMap::new();

    for packet in packets {
        let Some(stream) = packet.stream_id() else {
            continue;
        };
        if !window.contains(stream) {
            log::debug!("Dropping packet of stream {stream} outside {}", window.display_filter());
            continue;
        }
        buckets
            .entry(stream - window.start)
            .or_insert_with(|| Session::new(stream))
            .packets
            .push(packet);
    }

    buckets.into_values().collect()
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::analyser::containers::fixtures::PacketBuilder;
    use std::collections::{HashMap, HashSet};

    /// Serves packets per stream id and fails on scripted window starts.
    pub struct FakeDecoder {
        pub packets: Vec<Packet>,
        pub failing_starts: HashSet<u64>,
        pub windows: Vec<SliceWindow>,
    }

    impl FakeDecoder {
        pub fn new(packets: Vec<Packet>) -> Self {
            Self {
                packets,
                failing_starts: HashSet::new(),
                windows: Vec::new(),
            }
        }
    }

    impl SliceDecoder for FakeDecoder {
        fn decode(&mut self, window: &SliceWindow) -> Result<Vec<Packet>> {
            self.windows.push(*window);
            if self.failing_starts.contains(&window.start) {
                return Err(Error::Decode {
                    filter: window.display_filter(),
                    reason: "tshark crashed".to_string(),
                });
            }
            Ok(self
                .packets
                .iter()
                .filter(|packet| packet.stream_id().map_or(false, |id| window.contains(id)))
                .cloned()
                .collect())
        }
    }

    fn packet(stream: u64, len: u32) -> Packet {
        PacketBuilder::new().ip("10.0.0.1", "10.0.0.2").tcp(stream, len).build()
    }

    fn config(slice_size: u64) -> ExtractConfig {
        ExtractConfig {
            slice_size,
            ..ExtractConfig::default()
        }
    }

    #[test]
    fn window_filter() {
        let window = SliceWindow::new(10, 5);
        assert_eq!(window.display_filter(), "tcp.stream >= 10 and tcp.stream < 15");
        assert!(window.contains(14));
        assert!(!window.contains(15));
        assert_eq!(window.following(), SliceWindow::new(15, 5));
    }

    #[test]
    fn one_session_per_stream_id() {
        // Interleaved streams, spread over several windows.
        let streams = [0, 1, 0, 2, 3, 1, 4, 6, 5, 6, 0, 7];
        let packets: Vec<Packet> = streams
            .iter()
            .enumerate()
            .map(|(i, &stream)| packet(stream, i as u32))
            .collect();

        let segmenter = CaptureSegmenter::new(FakeDecoder::new(packets), &config(3));
        let sessions: Vec<(usize, Session)> = segmenter.collect();

        let distinct: HashSet<u64> = streams.iter().copied().collect();
        assert_eq!(sessions.len(), distinct.len());

        let ids: Vec<u64> = sessions.iter().map(|(_, s)| s.stream).collect();
        assert_eq!(ids, vec![0, 1, 2, 3, 4, 5, 6, 7]);
        let indices: Vec<usize> = sessions.iter().map(|(i, _)| *i).collect();
        assert_eq!(indices, (0..8).collect::<Vec<_>>());

        let counts: HashMap<u64, usize> = sessions.iter().map(|(_, s)| (s.stream, s.packets.len())).collect();
        assert_eq!(counts[&0], 3);
        assert_eq!(counts[&6], 2);
    }

    #[test]
    fn packets_keep_capture_order() {
        let packets = vec![packet(0, 1), packet(1, 2), packet(0, 3)];
        let sessions = splice_sessions(&SliceWindow::new(0, 10), packets);
        let lens: Vec<i64> = sessions[0]
            .packets
            .iter()
            .map(|p| match p.tcp().unwrap().scoped("len").unwrap().value {
                crate::analyser::containers::FieldValue::Integer(v) => v,
                _ => -1,
            })
            .collect();
        assert_eq!(lens, vec![1, 3]);
    }

    #[test]
    fn packets_without_tcp_are_dropped() {
        let udp = PacketBuilder::new().ip("10.0.0.1", "10.0.0.2").build();
        let sessions = splice_sessions(&SliceWindow::new(0, 10), vec![udp, packet(2, 0)]);
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].stream, 2);
    }

    #[test]
    fn failed_slice_does_not_stop_the_run() {
        let packets = (0..9).map(|stream| packet(stream, 0)).collect();
        let mut decoder = FakeDecoder::new(packets);
        decoder.failing_starts.insert(3);

        let mut segmenter = CaptureSegmenter::new(decoder, &config(3));
        let ids: Vec<u64> = segmenter.by_ref().map(|(_, s)| s.stream).collect();

        assert_eq!(ids, vec![0, 1, 2, 6, 7, 8]);
        assert_eq!(segmenter.failed_slices(), 1);
        // Two windows with data, one failed, one empty that ends the run.
        assert_eq!(segmenter.slices_decoded(), 4);
    }

    #[test]
    fn persistent_failures_end_the_run() {
        let mut decoder = FakeDecoder::new(vec![packet(0, 0)]);
        decoder.failing_starts.extend([0, 1, 2, 3, 4]);

        let mut segmenter = CaptureSegmenter::new(decoder, &config(1));
        assert!(segmenter.next().is_none());
        assert_eq!(segmenter.failed_slices(), 3);
    }

    #[test]
    fn raised_failure_limit_outlasts_a_bad_stretch() {
        let packets = (0..6).map(|stream| packet(stream, 0)).collect();
        let mut decoder = FakeDecoder::new(packets);
        decoder.failing_starts.extend([0, 1, 2, 3]);

        let config = ExtractConfig {
            slice_size: 1,
            max_consecutive_failures: 5,
            ..ExtractConfig::default()
        };
        let mut segmenter = CaptureSegmenter::new(decoder, &config);
        let ids: Vec<u64> = segmenter.by_ref().map(|(_, s)| s.stream).collect();

        assert_eq!(ids, vec![4, 5]);
        assert_eq!(segmenter.failed_slices(), 4);
    }

    #[test]
    fn max_slices_bounds_the_run() {
        let packets = (0..10).map(|stream| packet(stream, 0)).collect();
        let config = ExtractConfig {
            slice_size: 2,
            max_slices: Some(2),
            ..ExtractConfig::default()
        };
        let segmenter = CaptureSegmenter::new(FakeDecoder::new(packets), &config);
        assert_eq!(segmenter.count(), 4);
    }
}
