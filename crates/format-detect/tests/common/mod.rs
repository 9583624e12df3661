#![allow(dead_code)]

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use rand::Rng;
use sd_format_detect::{
	ByteSource, Detection, Detector, DetectorError, SniffContext, SourceError,
};
use tokio::time::sleep;

/// Builds a stored (uncompressed) zip archive with a central directory.
pub fn stored_zip(files: &[(&str, &[u8])]) -> Vec<u8> {
	let mut out = Vec::new();
	let mut central = Vec::new();

	for (name, data) in files {
		let offset = u32::try_from(out.len()).unwrap();
		let name_len = u16::try_from(name.len()).unwrap();
		let size = u32::try_from(data.len()).unwrap();

		out.extend_from_slice(b"PK\x03\x04");
		out.extend_from_slice(&[20, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
		out.extend_from_slice(&0u32.to_le_bytes());
		out.extend_from_slice(&size.to_le_bytes());
		out.extend_from_slice(&size.to_le_bytes());
		out.extend_from_slice(&name_len.to_le_bytes());
		out.extend_from_slice(&0u16.to_le_bytes());
		out.extend_from_slice(name.as_bytes());
		out.extend_from_slice(data);

		central.extend_from_slice(b"PK\x01\x02");
		central.extend_from_slice(&[20, 0, 20, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
		central.extend_from_slice(&0u32.to_le_bytes());
		central.extend_from_slice(&size.to_le_bytes());
		central.extend_from_slice(&size.to_le_bytes());
		central.extend_from_slice(&name_len.to_le_bytes());
		central.extend_from_slice(&[0; 12]);
		central.extend_from_slice(&offset.to_le_bytes());
		central.extend_from_slice(name.as_bytes());
	}

	let central_offset = u32::try_from(out.len()).unwrap();
	let count = u16::try_from(files.len()).unwrap();
	out.extend_from_slice(&central);
	out.extend_from_slice(b"PK\x05\x06");
	out.extend_from_slice(&[0; 4]);
	out.extend_from_slice(&count.to_le_bytes());
	out.extend_from_slice(&count.to_le_bytes());
	out.extend_from_slice(&u32::try_from(central.len()).unwrap().to_le_bytes());
	out.extend_from_slice(&central_offset.to_le_bytes());
	out.extend_from_slice(&0u16.to_le_bytes());

	out
}

/// Answers a fixed outcome after sleeping for a random amount of time.
#[derive(Debug)]
pub struct DelayedDetector {
	pub outcome: Detection,
	pub max_delay: Duration,
}

impl DelayedDetector {
	pub const fn new(outcome: Detection, max_delay: Duration) -> Self {
		Self { outcome, max_delay }
	}
}

#[async_trait]
impl Detector for DelayedDetector {
	async fn detect(&self, _ctx: &SniffContext) -> Result<Detection, DetectorError> {
		let delay = rand::thread_rng().gen_range(Duration::ZERO..=self.max_delay);
		sleep(delay).await;

		Ok(self.outcome)
	}
}

#[derive(Debug)]
pub struct PanickingDetector;

#[async_trait]
impl Detector for PanickingDetector {
	async fn detect(&self, _ctx: &SniffContext) -> Result<Detection, DetectorError> {
		panic!("this detector always panics");
	}
}

#[derive(Debug)]
pub struct FaultingDetector;

#[async_trait]
impl Detector for FaultingDetector {
	async fn detect(&self, _ctx: &SniffContext) -> Result<Detection, DetectorError> {
		Err(DetectorError::Fault("corrupted lookup table".to_string()))
	}
}

/// Hands out a prefix, then gets cancelled as soon as anyone asks for more.
#[derive(Debug)]
pub struct CancellingSource {
	pub prefix: Bytes,
}

#[async_trait]
impl ByteSource for CancellingSource {
	async fn peek(&mut self, max_bytes: usize) -> Result<Bytes, SourceError> {
		Ok(self.prefix.slice(..max_bytes.min(self.prefix.len())))
	}

	async fn read_more(&mut self, _additional: usize) -> Result<Bytes, SourceError> {
		Err(SourceError::Cancelled)
	}
}

/// Never delivers a single byte.
#[derive(Debug)]
pub struct StalledSource;

#[async_trait]
impl ByteSource for StalledSource {
	async fn peek(&mut self, _max_bytes: usize) -> Result<Bytes, SourceError> {
		std::future::pending().await
	}
}
