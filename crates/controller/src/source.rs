//! Snapshot sources feeding the tick loop

use crate::error::ControllerError;
use overtake_model::VehicleSnapshot;
use std::io::BufRead;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tracing::warn;

/// What a source had for this tick
#[derive(Debug, Clone, PartialEq)]
pub enum SourceEvent {
    Snapshot(VehicleSnapshot),
    /// Nothing yet, try again next tick
    Idle,
    /// No more snapshots will arrive
    Finished,
}

/// Non-blocking supplier of vehicle snapshots
pub trait SnapshotSource {
    fn poll_snapshot(&mut self) -> Result<SourceEvent, ControllerError>;
}

/// Replays one JSON snapshot per line
pub struct JsonLinesSource<R> {
    reader: R,
    line: String,
    line_number: usize,
}

impl<R: BufRead> JsonLinesSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: String::new(),
            line_number: 0,
        }
    }
}

impl<R: BufRead> SnapshotSource for JsonLinesSource<R> {
    fn poll_snapshot(&mut self) -> Result<SourceEvent, ControllerError> {
        loop {
            self.line.clear();
            if self.reader.read_line(&mut self.line)? == 0 {
                return Ok(SourceEvent::Finished);
            }
            self.line_number += 1;

            let text = self.line.trim();
            if text.is_empty() {
                continue;
            }
            match serde_json::from_str::<VehicleSnapshot>(text) {
                Ok(snapshot) => return Ok(SourceEvent::Snapshot(snapshot)),
                Err(e) => warn!("Skipping malformed snapshot on line {}: {}", self.line_number, e),
            }
        }
    }
}

/// Latest snapshot from an in-process channel; older queued ones are dropped
pub struct ChannelSnapshotSource {
    rx: mpsc::Receiver<VehicleSnapshot>,
    latest: Option<VehicleSnapshot>,
}

impl ChannelSnapshotSource {
    pub fn new(rx: mpsc::Receiver<VehicleSnapshot>) -> Self {
        Self { rx, latest: None }
    }
}

impl SnapshotSource for ChannelSnapshotSource {
    fn poll_snapshot(&mut self) -> Result<SourceEvent, ControllerError> {
        loop {
            match self.rx.try_recv() {
                Ok(snapshot) => self.latest = Some(snapshot),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => return Ok(SourceEvent::Finished),
            }
        }
        // stale input is re-used until a fresher one arrives
        Ok(match &self.latest {
            Some(snapshot) => SourceEvent::Snapshot(snapshot.clone()),
            None => SourceEvent::Idle,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_json_lines_skips_bad_lines() {
        let input = "{\"v_ego\": 90.0, \"onroad\": true}\n\nnot json\n{\"v_ego\": 95.0}\n";
        let mut source = JsonLinesSource::new(Cursor::new(input));

        match source.poll_snapshot().unwrap() {
            SourceEvent::Snapshot(snap) => {
                assert_eq!(snap.v_ego, 90.0);
                assert!(snap.onroad);
            }
            other => panic!("unexpected {:?}", other),
        }
        match source.poll_snapshot().unwrap() {
            SourceEvent::Snapshot(snap) => assert_eq!(snap.v_ego, 95.0),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(source.poll_snapshot().unwrap(), SourceEvent::Finished);
    }

    #[tokio::test]
    async fn test_channel_source_keeps_latest() {
        let (tx, rx) = mpsc::channel(8);
        let mut source = ChannelSnapshotSource::new(rx);
        assert_eq!(source.poll_snapshot().unwrap(), SourceEvent::Idle);

        for speed in [80.0, 85.0] {
            tx.send(VehicleSnapshot {
                v_ego: speed,
                ..Default::default()
            })
            .await
            .unwrap();
        }
        for _ in 0..2 {
            match source.poll_snapshot().unwrap() {
                SourceEvent::Snapshot(snap) => assert_eq!(snap.v_ego, 85.0),
                other => panic!("unexpected {:?}", other),
            }
        }

        drop(tx);
        assert_eq!(source.poll_snapshot().unwrap(), SourceEvent::Finished);
    }
}
