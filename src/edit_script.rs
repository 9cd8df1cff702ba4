use similar::{Algorithm, DiffTag};
use std::time::{Duration, Instant};

use crate::error::PatchError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpanKind {
    Equal,
    Insert,
    Delete,
}

/// One span of an edit script. `Equal` and `Delete` text comes from the
/// baseline, `Insert` text is new.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    pub kind: SpanKind,
    pub text: Vec<u8>,
}

impl Span {
    pub fn new(kind: SpanKind, text: &[u8]) -> Self {
        Self {
            kind,
            text: text.to_vec(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EditScript {
    spans: Vec<Span>,
}

impl EditScript {
    pub fn from_spans(spans: Vec<Span>) -> Self {
        Self { spans }
    }

    pub fn spans(&self) -> &[Span] {
        &self.spans
    }

    pub fn len(&self) -> usize {
        self.spans.len()
    }

    /// True when the script says "copy the whole baseline, change nothing".
    pub fn is_identity(&self, baseline: &[u8]) -> bool {
        match self.spans.as_slice() {
            [] => baseline.is_empty(),
            [only] => only.kind == SpanKind::Equal && only.text.len() == baseline.len(),
            _ => false,
        }
    }

    /// Check both reconstruction invariants: `Equal`+`Delete` spans rebuild
    /// `baseline`, `Equal`+`Insert` spans rebuild `target`.
    pub fn reconstructs(&self, baseline: &[u8], target: &[u8]) -> bool {
        let mut old_pos = 0usize;
        let mut new_pos = 0usize;
        for span in &self.spans {
            let n = span.text.len();
            let old_side = matches!(span.kind, SpanKind::Equal | SpanKind::Delete);
            let new_side = matches!(span.kind, SpanKind::Equal | SpanKind::Insert);
            if old_side {
                if baseline.get(old_pos..old_pos + n) != Some(span.text.as_slice()) {
                    return false;
                }
                old_pos += n;
            }
            if new_side {
                if target.get(new_pos..new_pos + n) != Some(span.text.as_slice()) {
                    return false;
                }
                new_pos += n;
            }
        }
        old_pos == baseline.len() && new_pos == target.len()
    }
}

/// A two-sequence comparison service. Any implementation is acceptable as
/// long as its output satisfies [`EditScript::reconstructs`]; minimality
/// only affects patch size.
pub trait DiffService: Send + Sync {
    fn diff(&self, old: &[u8], new: &[u8]) -> EditScript;
}

/// Byte-level Myers diff backed by `similar`. Past the deadline the
/// algorithm falls back to a coarser, still correct, script.
pub struct MyersDiff {
    pub timeout: Option<Duration>,
}

impl Default for MyersDiff {
    fn default() -> Self {
        Self {
            timeout: Some(Duration::from_secs(30)),
        }
    }
}

impl DiffService for MyersDiff {
    fn diff(&self, old: &[u8], new: &[u8]) -> EditScript {
        let deadline = self.timeout.map(|t| Instant::now() + t);
        let ops = similar::capture_diff_slices_deadline(Algorithm::Myers, old, new, deadline);

        let mut spans = Vec::with_capacity(ops.len());
        for op in ops {
            let (tag, old_range, new_range) = op.as_tag_tuple();
            match tag {
                DiffTag::Equal => spans.push(Span::new(SpanKind::Equal, &old[old_range])),
                DiffTag::Delete => spans.push(Span::new(SpanKind::Delete, &old[old_range])),
                DiffTag::Insert => spans.push(Span::new(SpanKind::Insert, &new[new_range])),
                DiffTag::Replace => {
                    spans.push(Span::new(SpanKind::Delete, &old[old_range]));
                    spans.push(Span::new(SpanKind::Insert, &new[new_range]));
                }
            }
        }
        EditScript::from_spans(spans)
    }
}

/// Which comparison produced the script that was kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pass {
    Raw,
    CarriageReturnsStripped,
}

/// Runs the diff service, and for text baselines a second time against the
/// modified text with carriage returns removed, keeping the shorter script.
pub struct EditScriptAdapter<D> {
    service: D,
    strip_carriage_returns: bool,
}

impl<D: DiffService> EditScriptAdapter<D> {
    pub fn new(service: D, strip_carriage_returns: bool) -> Self {
        Self {
            service,
            strip_carriage_returns,
        }
    }

    pub fn diff(
        &self,
        baseline: &[u8],
        modified: &[u8],
        baseline_is_text: bool,
    ) -> Result<(EditScript, Pass), PatchError> {
        let first = self.service.diff(baseline, modified);
        if !first.reconstructs(baseline, modified) {
            return Err(PatchError::BrokenEditScript);
        }

        if !self.strip_carriage_returns
            || first.len() <= 1
            || !baseline_is_text
            || !modified.contains(&b'\r')
        {
            return Ok((first, Pass::Raw));
        }

        let stripped: Vec<u8> = modified.iter().copied().filter(|&b| b != b'\r').collect();
        let second = self.service.diff(baseline, &stripped);
        if second.len() < first.len() && second.reconstructs(baseline, &stripped) {
            Ok((second, Pass::CarriageReturnsStripped))
        } else {
            Ok((first, Pass::Raw))
        }
    }
}
