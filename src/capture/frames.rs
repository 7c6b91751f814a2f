//! 802.11 management frame extraction from capture files

use crate::error::{AppError, Result};
use crate::types::{AuthAlgorithm, MacAddr};
use pcap_file::pcap::PcapReader;
use pcap_file::DataLink;
use serde::Serialize;
use std::io::Read;
use std::path::Path;
use std::time::Duration;

/// Fast BSS Transition information element
pub const TAG_FAST_BSS_TRANSITION: u8 = 55;
/// Mobility domain information element
pub const TAG_MOBILITY_DOMAIN: u8 = 54;
pub const STATUS_SUCCESS: u16 = 0;

const MGMT_HEADER_LEN: usize = 24;
const HT_CONTROL_LEN: usize = 4;
const FCS_LEN: usize = 4;
const FIXED_FIELDS_LEN: usize = 6;

const SUBTYPE_ASSOC_RESPONSE: u8 = 1;
const SUBTYPE_REASSOC_RESPONSE: u8 = 3;
const SUBTYPE_AUTHENTICATION: u8 = 11;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FrameKind {
    Authentication,
    AssociationResponse,
    ReassociationResponse,
    /// Any other management subtype
    Other(u8),
}

/// One parsed management frame. Timestamps are the capture's own record times
/// (epoch based) and keep the file's order, inversions included.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaptureFrame {
    pub timestamp: Duration,
    pub kind: FrameKind,
    pub status: Option<u16>,
    pub destination: MacAddr,
    pub source: MacAddr,
    pub bssid: MacAddr,
    pub auth_algorithm: Option<AuthAlgorithm>,
    pub auth_sequence: Option<u16>,
    pub tags: Vec<u8>,
}

impl CaptureFrame {
    pub fn has_tag(&self, tag: u8) -> bool {
        self.tags.contains(&tag)
    }
}

/// Reassociation response lookup
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReassociationQuery {
    pub status: u16,
    pub require_ft_element: bool,
}

impl Default for ReassociationQuery {
    fn default() -> Self {
        Self { status: STATUS_SUCCESS, require_ft_element: true }
    }
}

/// Authentication frame lookup
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AuthenticationQuery {
    pub algorithm: AuthAlgorithm,
    pub sequence: u16,
    pub status: u16,
}

impl Default for AuthenticationQuery {
    fn default() -> Self {
        Self { algorithm: AuthAlgorithm::FastTransition, sequence: 1, status: STATUS_SUCCESS }
    }
}

/// Parsed management frames of one capture
#[derive(Debug, Clone, Default)]
pub struct FrameAnalyzer {
    frames: Vec<CaptureFrame>,
    packets: usize,
    truncated: bool,
}

impl FrameAnalyzer {
    pub fn from_frames(frames: Vec<CaptureFrame>) -> Self {
        Self { packets: frames.len(), frames, truncated: false }
    }

    pub fn from_pcap_file(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)
            .map_err(|e| AppError::io(format!("Cannot open capture {}: {}", path.display(), e)))?;
        Self::from_pcap_reader(std::io::BufReader::new(file))
    }

    /// Parse a classic pcap stream with a radiotap or raw 802.11 link type.
    ///
    /// A damaged trailing record (sniffer killed mid-write) ends the walk;
    /// frames parsed up to that point are kept.
    pub fn from_pcap_reader<R: Read>(reader: R) -> Result<Self> {
        let mut reader = PcapReader::new(reader)?;
        let datalink = reader.header().datalink;
        let link = match datalink {
            DataLink::IEEE802_11_RADIOTAP => LinkKind::Radiotap,
            DataLink::IEEE802_11 => LinkKind::Raw,
            other => {
                return Err(AppError::parse(format!(
                    "Unsupported capture link type {:?} (need 802.11 or radiotap)",
                    other
                )))
            }
        };

        let mut analyzer = Self::default();

        while let Some(packet) = reader.next_packet() {
            let packet = match packet {
                Ok(packet) => packet,
                Err(_) if analyzer.packets > 0 => {
                    analyzer.truncated = true;
                    break;
                }
                Err(e) => return Err(e.into()),
            };
            analyzer.packets += 1;

            if let Some(frame) = parse_link_frame(link, &packet.data, packet.timestamp) {
                analyzer.frames.push(frame);
            }
        }

        Ok(analyzer)
    }

    pub fn frames(&self) -> &[CaptureFrame] {
        &self.frames
    }

    /// Packets read from the file, management or not
    pub fn packet_count(&self) -> usize {
        self.packets
    }

    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    /// Earliest reassociation response to `station` with the requested status
    pub fn find_reassociation(&self, station: MacAddr, query: &ReassociationQuery) -> Option<Duration> {
        self.frames
            .iter()
            .filter(|f| f.kind == FrameKind::ReassociationResponse)
            .filter(|f| f.destination == station)
            .filter(|f| f.status == Some(query.status))
            .filter(|f| !query.require_ft_element || f.has_tag(TAG_FAST_BSS_TRANSITION))
            .map(|f| f.timestamp)
            .min()
    }

    /// Earliest authentication frame sent by `station` matching the query
    pub fn find_authentication(&self, station: MacAddr, query: &AuthenticationQuery) -> Option<Duration> {
        self.frames
            .iter()
            .filter(|f| f.kind == FrameKind::Authentication)
            .filter(|f| f.source == station)
            .filter(|f| f.auth_algorithm == Some(query.algorithm))
            .filter(|f| f.auth_sequence == Some(query.sequence))
            .filter(|f| f.status == Some(query.status))
            .map(|f| f.timestamp)
            .min()
    }

    /// Status codes of every reassociation response to `station`, in capture order
    pub fn reassociation_statuses(&self, station: MacAddr) -> Vec<u16> {
        let mut matches: Vec<&CaptureFrame> = self
            .frames
            .iter()
            .filter(|f| f.kind == FrameKind::ReassociationResponse && f.destination == station)
            .collect();
        matches.sort_by_key(|f| f.timestamp);
        matches.iter().filter_map(|f| f.status).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum LinkKind {
    Radiotap,
    Raw,
}

fn parse_link_frame(link: LinkKind, data: &[u8], timestamp: Duration) -> Option<CaptureFrame> {
    match link {
        LinkKind::Raw => parse_management_frame(data, timestamp),
        LinkKind::Radiotap => {
            let (header_len, has_fcs) = radiotap_layout(data)?;
            let mut frame = data.get(header_len..)?;
            if has_fcs {
                frame = frame.get(..frame.len().checked_sub(FCS_LEN)?)?;
            }
            parse_management_frame(frame, timestamp)
        }
    }
}

/// Radiotap header length and whether the frame carries a trailing FCS
fn radiotap_layout(data: &[u8]) -> Option<(usize, bool)> {
    match radiotap::Radiotap::from_bytes(data) {
        Ok(rt) => Some((rt.header.length, rt.flags.map_or(false, |f| f.fcs))),
        Err(_) => {
            // Unknown vendor namespaces: fall back to the fixed header length field
            let len = u16::from_le_bytes([*data.get(2)?, *data.get(3)?]) as usize;
            (len <= data.len()).then_some((len, false))
        }
    }
}

/// Parse a bare 802.11 frame (no FCS). Non-management frames yield `None`.
pub fn parse_management_frame(data: &[u8], timestamp: Duration) -> Option<CaptureFrame> {
    if data.len() < MGMT_HEADER_LEN {
        return None;
    }

    let fc0 = data[0];
    let fc1 = data[1];
    let version = fc0 & 0x03;
    let frame_type = (fc0 >> 2) & 0x03;
    let subtype = (fc0 >> 4) & 0x0f;
    if version != 0 || frame_type != 0 {
        return None;
    }

    let destination = MacAddr::from_slice(&data[4..10])?;
    let source = MacAddr::from_slice(&data[10..16])?;
    let bssid = MacAddr::from_slice(&data[16..22])?;

    let header_len = if fc1 & 0x80 != 0 { MGMT_HEADER_LEN + HT_CONTROL_LEN } else { MGMT_HEADER_LEN };
    let body = data.get(header_len..).unwrap_or(&[]);

    let kind = match subtype {
        SUBTYPE_AUTHENTICATION => FrameKind::Authentication,
        SUBTYPE_ASSOC_RESPONSE => FrameKind::AssociationResponse,
        SUBTYPE_REASSOC_RESPONSE => FrameKind::ReassociationResponse,
        other => FrameKind::Other(other),
    };

    let mut frame = CaptureFrame {
        timestamp,
        kind,
        status: None,
        destination,
        source,
        bssid,
        auth_algorithm: None,
        auth_sequence: None,
        tags: Vec::new(),
    };

    match kind {
        FrameKind::Authentication => {
            frame.auth_algorithm = read_u16(body, 0).map(AuthAlgorithm::from_code);
            frame.auth_sequence = read_u16(body, 2);
            frame.status = read_u16(body, 4);
            frame.tags = element_tags(body.get(FIXED_FIELDS_LEN..).unwrap_or(&[]));
        }
        FrameKind::AssociationResponse | FrameKind::ReassociationResponse => {
            // capability, status, association id
            frame.status = read_u16(body, 2);
            frame.tags = element_tags(body.get(FIXED_FIELDS_LEN..).unwrap_or(&[]));
        }
        FrameKind::Other(_) => {}
    }

    Some(frame)
}

fn read_u16(body: &[u8], offset: usize) -> Option<u16> {
    Some(u16::from_le_bytes([*body.get(offset)?, *body.get(offset + 1)?]))
}

/// Tag numbers of the information elements; stops at the first malformed element
fn element_tags(mut elements: &[u8]) -> Vec<u8> {
    let mut tags = Vec::new();
    while elements.len() >= 2 {
        let tag = elements[0];
        let len = elements[1] as usize;
        if elements.len() < 2 + len {
            break;
        }
        tags.push(tag);
        elements = &elements[2 + len..];
    }
    tags
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    fn sta() -> MacAddr {
        "a:1b:2c:d:e:f".parse().unwrap()
    }

    fn ap1() -> MacAddr {
        "94:a6:7e:54:d4:31".parse().unwrap()
    }

    fn ap2() -> MacAddr {
        "94:a6:7e:54:d4:33".parse().unwrap()
    }

    #[test]
    fn test_parse_authentication_frame() {
        let data = auth_frame(sta(), ap2(), 2, 1, 0);
        let frame = parse_management_frame(&data, Duration::from_secs(1)).unwrap();
        assert_eq!(frame.kind, FrameKind::Authentication);
        assert_eq!(frame.source, sta());
        assert_eq!(frame.destination, ap2());
        assert_eq!(frame.auth_algorithm, Some(AuthAlgorithm::FastTransition));
        assert_eq!(frame.auth_sequence, Some(1));
        assert_eq!(frame.status, Some(0));
        assert_eq!(frame.tags, vec![TAG_MOBILITY_DOMAIN]);
    }

    #[test]
    fn test_parse_reassociation_response() {
        let data = reassoc_response(sta(), ap2(), 0, true);
        let frame = parse_management_frame(&data, Duration::ZERO).unwrap();
        assert_eq!(frame.kind, FrameKind::ReassociationResponse);
        assert_eq!(frame.destination, sta());
        assert_eq!(frame.bssid, ap2());
        assert_eq!(frame.status, Some(0));
        assert!(frame.has_tag(TAG_FAST_BSS_TRANSITION));
    }

    #[test]
    fn test_order_bit_shifts_body() {
        let mut data = reassoc_response(sta(), ap2(), 0, true);
        data[1] |= 0x80;
        data.splice(24..24, [0xaa, 0xbb, 0xcc, 0xdd]);
        let frame = parse_management_frame(&data, Duration::ZERO).unwrap();
        assert_eq!(frame.status, Some(0));
        assert!(frame.has_tag(TAG_FAST_BSS_TRANSITION));
    }

    #[test]
    fn test_non_management_frames_ignored() {
        let mut data = beacon(ap1());
        data[0] = 0x08; // data frame
        assert!(parse_management_frame(&data, Duration::ZERO).is_none());
        assert!(parse_management_frame(&data[..10], Duration::ZERO).is_none());
    }

    #[test]
    fn test_malformed_elements_stop_walk() {
        assert_eq!(element_tags(&[0, 2, b'a', b'b', 55, 10, 1]), vec![0]);
        assert!(element_tags(&[7]).is_empty());
    }

    #[test]
    fn test_radiotap_capture_with_fcs() {
        let bytes = pcap(
            127,
            &[
                (100, 0, radiotap(&beacon(ap1()), true)),
                (110, 0, radiotap(&auth_frame(sta(), ap2(), 2, 1, 0), true)),
                (110, 35_000, radiotap(&reassoc_response(sta(), ap2(), 0, true), true)),
            ],
        );
        let analyzer = FrameAnalyzer::from_pcap_reader(bytes.as_slice()).unwrap();

        assert_eq!(analyzer.packet_count(), 3);
        assert_eq!(analyzer.frames().len(), 3);
        assert!(!analyzer.is_truncated());

        let auth = analyzer.find_authentication(sta(), &AuthenticationQuery::default()).unwrap();
        let reassoc = analyzer.find_reassociation(sta(), &ReassociationQuery::default()).unwrap();
        assert_eq!(auth, Duration::from_secs(110));
        assert_eq!(reassoc, Duration::from_millis(110_035));
    }

    #[test]
    fn test_raw_80211_capture() {
        let bytes = pcap(105, &[(5, 0, reassoc_response(sta(), ap2(), 0, false))]);
        let analyzer = FrameAnalyzer::from_pcap_reader(bytes.as_slice()).unwrap();
        assert!(analyzer.find_reassociation(sta(), &ReassociationQuery::default()).is_none());

        let relaxed = ReassociationQuery { require_ft_element: false, ..Default::default() };
        assert_eq!(analyzer.find_reassociation(sta(), &relaxed), Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_unsupported_link_type() {
        let bytes = pcap(1, &[(1, 0, vec![0u8; 60])]);
        let err = FrameAnalyzer::from_pcap_reader(bytes.as_slice()).unwrap_err();
        assert_eq!(err.category(), "PARSE");
    }

    #[test]
    fn test_out_of_order_records_keep_their_times() {
        let bytes = pcap(
            105,
            &[
                (1_700_000_010, 0, auth_frame(sta(), ap2(), 2, 1, 0)),
                (1_700_000_009, 980_000, reassoc_response(sta(), ap2(), 0, true)),
            ],
        );
        let analyzer = FrameAnalyzer::from_pcap_reader(bytes.as_slice()).unwrap();

        let auth = analyzer.find_authentication(sta(), &AuthenticationQuery::default()).unwrap();
        let reassoc = analyzer.find_reassociation(sta(), &ReassociationQuery::default()).unwrap();
        assert!(reassoc < auth);
        assert_eq!(auth - reassoc, Duration::from_millis(20));
    }

    #[test]
    fn test_truncated_trailing_record_keeps_frames() {
        let mut bytes = pcap(105, &[(1, 0, auth_frame(sta(), ap2(), 2, 1, 0)), (1, 10, beacon(ap1()))]);
        bytes.truncate(bytes.len() - 5);
        let analyzer = FrameAnalyzer::from_pcap_reader(bytes.as_slice()).unwrap();
        assert_eq!(analyzer.frames().len(), 1);
        assert_eq!(analyzer.frames()[0].kind, FrameKind::Authentication);
    }

    #[test]
    fn test_first_chronological_match_wins() {
        let frames = vec![
            parse_management_frame(&reassoc_response(sta(), ap2(), 0, true), Duration::from_millis(900)).unwrap(),
            parse_management_frame(&reassoc_response(sta(), ap1(), 0, true), Duration::from_millis(300)).unwrap(),
        ];
        let analyzer = FrameAnalyzer::from_frames(frames);
        assert_eq!(
            analyzer.find_reassociation(sta(), &ReassociationQuery::default()),
            Some(Duration::from_millis(300))
        );
    }

    #[test]
    fn test_matching_is_exact() {
        let other: MacAddr = "0a:1b:2c:0d:0e:10".parse().unwrap();
        let frames = vec![
            parse_management_frame(&auth_frame(other, ap2(), 2, 1, 0), Duration::from_millis(1)).unwrap(),
            parse_management_frame(&auth_frame(sta(), ap2(), 0, 1, 0), Duration::from_millis(2)).unwrap(),
            parse_management_frame(&auth_frame(sta(), ap2(), 2, 2, 0), Duration::from_millis(3)).unwrap(),
            parse_management_frame(&reassoc_response(sta(), ap2(), 17, true), Duration::from_millis(4)).unwrap(),
        ];
        let analyzer = FrameAnalyzer::from_frames(frames);

        assert!(analyzer.find_authentication(sta(), &AuthenticationQuery::default()).is_none());
        let open = AuthenticationQuery { algorithm: AuthAlgorithm::Open, ..Default::default() };
        assert_eq!(analyzer.find_authentication(sta(), &open), Some(Duration::from_millis(2)));
        assert!(analyzer.find_reassociation(sta(), &ReassociationQuery::default()).is_none());
        assert_eq!(analyzer.reassociation_statuses(sta()), vec![17]);
    }
}
