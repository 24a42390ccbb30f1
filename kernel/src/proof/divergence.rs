//! O(1) divergence localization over fixed-stride trace payloads.
//!
//! Finding the first differing byte is a word-at-a-time scan; everything
//! after that is constant-time arithmetic over the frame geometry:
//!
//! ```text
//! offset_in_body  = d - body_start
//! step            = offset_in_body / bytes_per_step
//! offset_in_frame = offset_in_body % bytes_per_step
//! region          = [0,4) op code | [4, 4+4A) args | identity | status
//! ```

use crate::carrier::bytetrace::TraceHeaderV1;

/// Which part of a frame a differing byte falls in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameRegion {
    /// The 4-byte operator code.
    OpCode,
    /// The padded operator args.
    OpArgs { arg_index: usize },
    /// The identity plane; `byte` is the offset within the 4-byte lane.
    Identity {
        layer: usize,
        slot: usize,
        byte: usize,
    },
    /// The status plane.
    Status { layer: usize, slot: usize },
    /// Before the body (magic/header section).
    Header,
    /// After the body (footer section).
    Footer,
}

/// A localized divergence between two payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DivergenceSite {
    /// Frame index (frame 0 is the initial-state sentinel).
    pub step: usize,
    pub region: FrameRegion,
    /// Byte offset within the frame (0 for header/footer regions).
    pub offset_in_frame: usize,
    /// Absolute byte offset within the payload.
    pub payload_offset: usize,
}

/// First index where `a` and `b` differ, scanning a word at a time.
///
/// Returns `None` for byte-identical inputs of equal length; unequal lengths
/// diverge at the shorter length if the common prefix matches.
#[must_use]
pub fn first_differing_byte(a: &[u8], b: &[u8]) -> Option<usize> {
    let common = a.len().min(b.len());
    let words = common / 8;

    for w in 0..words {
        let offset = w * 8;
        let wa = u64::from_le_bytes(word_at(a, offset));
        let wb = u64::from_le_bytes(word_at(b, offset));
        let diff = wa ^ wb;
        if diff != 0 {
            return Some(offset + (diff.trailing_zeros() / 8) as usize);
        }
    }
    for i in words * 8..common {
        if a[i] != b[i] {
            return Some(i);
        }
    }
    if a.len() == b.len() {
        None
    } else {
        Some(common)
    }
}

fn word_at(data: &[u8], offset: usize) -> [u8; 8] {
    let mut word = [0u8; 8];
    word.copy_from_slice(&data[offset..offset + 8]);
    word
}

/// Map the first differing byte of two payloads to a frame-relative site.
///
/// Both payloads must start with the standard layout
/// (`magic || header_len || header || body || …`); the geometry comes from
/// `header`. Returns `None` for byte-identical payloads.
#[must_use]
pub fn locate(payload_a: &[u8], payload_b: &[u8], header: &TraceHeaderV1) -> Option<DivergenceSite> {
    let d = first_differing_byte(payload_a, payload_b)?;
    Some(locate_at(d, payload_a, header))
}

/// Map a known payload offset to its site. Constant time.
#[must_use]
pub fn locate_at(payload_offset: usize, payload: &[u8], header: &TraceHeaderV1) -> DivergenceSite {
    let header_len = if payload.len() >= 6 {
        u16::from_le_bytes([payload[4], payload[5]]) as usize
    } else {
        0
    };
    let body_start = 4 + 2 + header_len;
    let stride = header.bytes_per_step().unwrap_or(usize::MAX);
    let body_len = header.body_len().unwrap_or(0);

    if payload_offset < body_start {
        return DivergenceSite {
            step: 0,
            region: FrameRegion::Header,
            offset_in_frame: 0,
            payload_offset,
        };
    }
    let offset_in_body = payload_offset - body_start;
    if offset_in_body >= body_len {
        return DivergenceSite {
            step: header.step_count,
            region: FrameRegion::Footer,
            offset_in_frame: 0,
            payload_offset,
        };
    }

    let step = offset_in_body / stride;
    let offset_in_frame = offset_in_body % stride;
    DivergenceSite {
        step,
        region: frame_region(offset_in_frame, header),
        offset_in_frame,
        payload_offset,
    }
}

/// Region arithmetic for one frame-relative offset.
#[must_use]
pub fn frame_region(offset_in_frame: usize, header: &TraceHeaderV1) -> FrameRegion {
    let arg_bytes = header.arg_slot_count * 4;
    let identity_bytes = header.layer_count * header.slot_count * 4;

    if offset_in_frame < 4 {
        return FrameRegion::OpCode;
    }
    let after_code = offset_in_frame - 4;
    if after_code < arg_bytes {
        return FrameRegion::OpArgs {
            arg_index: after_code / 4,
        };
    }
    let after_args = after_code - arg_bytes;
    if after_args < identity_bytes {
        let lane = after_args / 4;
        return FrameRegion::Identity {
            layer: lane / header.slot_count,
            slot: lane % header.slot_count,
            byte: after_args % 4,
        };
    }
    let lane = after_args - identity_bytes;
    FrameRegion::Status {
        layer: lane / header.slot_count,
        slot: lane % header.slot_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> TraceHeaderV1 {
        TraceHeaderV1 {
            schema_version: "bytestate.v1".into(),
            domain_id: "rome".into(),
            registry_digest: "sha256:aa".into(),
            operator_set_digest: "sha256:bb".into(),
            policy_digest: "sha256:cc".into(),
            fixture_hash: "sha256:dd".into(),
            step_count: 3,
            layer_count: 4,
            slot_count: 32,
            arg_slot_count: 1,
            index_digest: None,
        }
    }

    #[test]
    fn identical_slices_have_no_divergence() {
        let data = vec![7u8; 100];
        assert_eq!(first_differing_byte(&data, &data.clone()), None);
    }

    #[test]
    fn finds_first_difference_in_word_and_tail() {
        // Difference inside an aligned word.
        let mut b = vec![0u8; 64];
        b[19] = 1;
        assert_eq!(first_differing_byte(&vec![0u8; 64], &b), Some(19));

        // Difference in the sub-word tail.
        let mut d = vec![0u8; 13];
        d[12] = 9;
        assert_eq!(first_differing_byte(&vec![0u8; 13], &d), Some(12));
    }

    #[test]
    fn length_mismatch_diverges_at_common_length() {
        assert_eq!(first_differing_byte(&[1, 2, 3], &[1, 2, 3, 4]), Some(3));
    }

    #[test]
    fn earliest_difference_wins() {
        let mut b = vec![0u8; 32];
        b[5] = 1;
        b[30] = 1;
        assert_eq!(first_differing_byte(&vec![0u8; 32], &b), Some(5));
    }

    #[test]
    fn region_boundaries() {
        let h = header();
        // Stride: 4 + 4 + 640 + 128 = 776.
        assert_eq!(h.bytes_per_step(), Some(776));
        assert_eq!(frame_region(0, &h), FrameRegion::OpCode);
        assert_eq!(frame_region(3, &h), FrameRegion::OpCode);
        assert_eq!(frame_region(4, &h), FrameRegion::OpArgs { arg_index: 0 });
        assert_eq!(frame_region(7, &h), FrameRegion::OpArgs { arg_index: 0 });
        assert_eq!(
            frame_region(8, &h),
            FrameRegion::Identity {
                layer: 0,
                slot: 0,
                byte: 0
            }
        );
        // Last identity byte: 8 + 640 - 1.
        assert_eq!(
            frame_region(647, &h),
            FrameRegion::Identity {
                layer: 3,
                slot: 31,
                byte: 3
            }
        );
        assert_eq!(
            frame_region(648, &h),
            FrameRegion::Status { layer: 0, slot: 0 }
        );
        assert_eq!(
            frame_region(775, &h),
            FrameRegion::Status {
                layer: 3,
                slot: 31
            }
        );
    }

    #[test]
    fn locate_maps_body_offsets_to_steps() {
        let h = header();
        let stride = h.bytes_per_step().unwrap();
        // Synthetic payload: 4 magic + 2 len + 10 header + body.
        let header_json_len = 10usize;
        let body_start = 4 + 2 + header_json_len;
        let total = body_start + 3 * stride + 6;
        let payload_a = {
            let mut p = vec![0u8; total];
            p[4] = 10; // header_len LE low byte
            p
        };
        let mut payload_b = payload_a.clone();

        // Flip a byte in frame 1's identity region: offset 8 within frame.
        let flip = body_start + stride + 8;
        payload_b[flip] ^= 0x80;
        let site = locate(&payload_a, &payload_b, &h).unwrap();
        assert_eq!(site.step, 1);
        assert_eq!(site.offset_in_frame, 8);
        assert_eq!(
            site.region,
            FrameRegion::Identity {
                layer: 0,
                slot: 0,
                byte: 0
            }
        );
        assert_eq!(site.payload_offset, flip);
    }

    #[test]
    fn locate_flags_header_and_footer_regions() {
        let h = header();
        let stride = h.bytes_per_step().unwrap();
        let body_start = 4 + 2 + 10;
        let total = body_start + 3 * stride + 6;
        let mut payload_a = vec![0u8; total];
        payload_a[4] = 10;
        let mut payload_b = payload_a.clone();

        payload_b[7] ^= 1; // inside header section
        let site = locate(&payload_a, &payload_b, &h).unwrap();
        assert_eq!(site.region, FrameRegion::Header);

        let mut payload_c = payload_a.clone();
        payload_c[total - 1] ^= 1; // past the body
        let site = locate(&payload_a, &payload_c, &h).unwrap();
        assert_eq!(site.region, FrameRegion::Footer);
        assert_eq!(site.step, 3);
    }
}
