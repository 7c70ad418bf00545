//! Match scoring through an external scorer.
//!
//! Two invocation shapes are supported:
//! - pairwise: `scorer <probe> <gallery>` printing one integer,
//! - one-to-many: `scorer -p <probe> <g0> <g1> ...` printing one integer per
//!   gallery file, in argument order.
//!
//! Templates are written to scratch files for the duration of one call.

use crate::extract::Template;
use crate::pool::WorkerPool;
use crate::tool::{ScratchDir, Tool};
use crate::trace::{trace_event, trace_span};
use crate::util::{FpMatchError, FpMatchResult};
use std::path::PathBuf;

/// Unit of matching work submitted to the worker pool.
#[derive(Clone, Copy, Debug)]
pub enum MatchRequest<'a> {
    /// One probe against one gallery template.
    Pairwise {
        probe: &'a Template,
        gallery: &'a Template,
    },
    /// One probe against an ordered gallery in a single scorer call.
    OneToMany {
        probe: &'a Template,
        gallery: &'a [Template],
    },
}

impl MatchRequest<'_> {
    /// Short name of the request shape.
    pub fn kind(&self) -> &'static str {
        match self {
            MatchRequest::Pairwise { .. } => "pairwise",
            MatchRequest::OneToMany { .. } => "one-to-many",
        }
    }

    /// Returns the probe template.
    pub fn probe(&self) -> &Template {
        match self {
            MatchRequest::Pairwise { probe, .. } | MatchRequest::OneToMany { probe, .. } => probe,
        }
    }
}

/// Score of one probe against one gallery template.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MatchResult {
    pub probe_id: String,
    pub gallery_id: String,
    pub score: i64,
}

impl MatchResult {
    fn new(probe: &Template, gallery: &Template, score: i64) -> Self {
        Self {
            probe_id: probe.image_id.clone(),
            gallery_id: gallery.image_id.clone(),
            score,
        }
    }
}

/// Runs the external scorer for match requests.
#[derive(Clone, Debug)]
pub struct Scorer {
    tool: Tool,
    template_ext: String,
    scratch_root: Option<PathBuf>,
}

impl Scorer {
    /// Creates a scorer writing templates as `*.<template_ext>` files.
    pub fn new(tool: Tool, template_ext: impl Into<String>) -> Self {
        Self {
            tool,
            template_ext: template_ext.into(),
            scratch_root: None,
        }
    }

    /// Places scratch directories under `root` instead of the system temp dir.
    pub fn with_scratch_root(mut self, root: Option<PathBuf>) -> Self {
        self.scratch_root = root;
        self
    }

    /// Scores a request, returning one result per gallery template.
    pub fn score(&self, request: &MatchRequest<'_>) -> FpMatchResult<Vec<MatchResult>> {
        match *request {
            MatchRequest::Pairwise { probe, gallery } => {
                self.score_pair(probe, gallery).map(|result| vec![result])
            }
            MatchRequest::OneToMany { gallery, .. } if gallery.is_empty() => {
                Err(FpMatchError::InvalidMatchRequest {
                    kind: request.kind(),
                    reason: "gallery is empty",
                })
            }
            MatchRequest::OneToMany { probe, gallery } => self.score_one_to_many(probe, gallery),
        }
    }

    /// Scores every request on the pool; result groups follow input order.
    pub fn score_all(
        &self,
        pool: &WorkerPool,
        requests: &[MatchRequest<'_>],
    ) -> FpMatchResult<Vec<Vec<MatchResult>>> {
        let _span = trace_span!("match_all", requests = requests.len()).entered();
        let groups = pool.map(requests, |request| self.score(request))?;
        trace_event!(
            "requests_scored",
            groups = groups.len(),
            scores = groups.iter().map(Vec::len).sum::<usize>()
        );
        Ok(groups)
    }

    fn file_name(&self, stem: &str) -> String {
        format!("{stem}.{}", self.template_ext)
    }

    fn score_pair(&self, probe: &Template, gallery: &Template) -> FpMatchResult<MatchResult> {
        ScratchDir::scoped(self.scratch_root.as_deref(), |scratch| {
            let probe_file = scratch.write(&self.file_name("probe"), &probe.data)?;
            let gallery_file = scratch.write(&self.file_name("gallery"), &gallery.data)?;
            let stdout = self.tool.output([&probe_file, &gallery_file])?;
            let score = parse_score(&String::from_utf8_lossy(&stdout))?;
            Ok(MatchResult::new(probe, gallery, score))
        })
    }

    fn score_one_to_many(
        &self,
        probe: &Template,
        gallery: &[Template],
    ) -> FpMatchResult<Vec<MatchResult>> {
        ScratchDir::scoped(self.scratch_root.as_deref(), |scratch| {
            let probe_file = scratch.write(&self.file_name("probe"), &probe.data)?;
            let mut args = Vec::with_capacity(gallery.len() + 2);
            args.push(PathBuf::from("-p"));
            args.push(probe_file);
            for (idx, tpl) in gallery.iter().enumerate() {
                args.push(scratch.write(&self.file_name(&format!("gallery{idx}")), &tpl.data)?);
            }

            let stdout = self.tool.output(&args)?;
            let scores = parse_scores(&String::from_utf8_lossy(&stdout), gallery.len())?;
            Ok(gallery
                .iter()
                .zip(scores)
                .map(|(tpl, score)| MatchResult::new(probe, tpl, score))
                .collect())
        })
    }
}

/// Parses a single integer score, ignoring surrounding whitespace.
pub fn parse_score(output: &str) -> FpMatchResult<i64> {
    output.trim().parse().map_err(|err| FpMatchError::ScoreParse {
        output: output.to_string(),
        reason: format!("{err}"),
    })
}

/// Parses `expected` newline-separated integer scores.
pub fn parse_scores(output: &str, expected: usize) -> FpMatchResult<Vec<i64>> {
    let trimmed = output.trim();
    if trimmed.is_empty() {
        if expected == 0 {
            return Ok(Vec::new());
        }
        return Err(FpMatchError::ScoreParse {
            output: output.to_string(),
            reason: format!("expected {expected} scores, got none"),
        });
    }

    let scores = trimmed
        .lines()
        .map(parse_score)
        .collect::<FpMatchResult<Vec<_>>>()?;
    if scores.len() != expected {
        return Err(FpMatchError::ScoreParse {
            output: output.to_string(),
            reason: format!("expected {expected} scores, got {}", scores.len()),
        });
    }
    Ok(scores)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_score_tolerates_trailing_newline() {
        assert_eq!(parse_score("42\n").unwrap(), 42);
        assert_eq!(parse_score("  0 ").unwrap(), 0);
        assert!(matches!(
            parse_score("forty-two"),
            Err(FpMatchError::ScoreParse { .. })
        ));
    }

    #[test]
    fn many_scores_keep_positional_order() {
        assert_eq!(parse_scores("5\n12\n0", 3).unwrap(), vec![5, 12, 0]);
        assert_eq!(parse_scores("5\r\n12\r\n0\r\n", 3).unwrap(), vec![5, 12, 0]);
    }

    #[test]
    fn score_count_must_match_gallery() {
        let err = parse_scores("5\n12", 3).unwrap_err();
        assert!(matches!(err, FpMatchError::ScoreParse { reason, .. } if reason.contains("got 2")));
        assert!(parse_scores("\n", 1).is_err());
        assert!(parse_scores("", 0).unwrap().is_empty());
    }
}
