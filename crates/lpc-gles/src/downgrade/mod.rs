//! Staged version downgrade.
//!
//! Every tier boundary has one stage that rewrites the token buffer in place.
//! Going from tier N to tier M applies the stages for N..M in descending order,
//! and each stage ends by rewriting the `#version` directive.

mod es300;
mod es310;
mod es320;
pub(crate) mod scan;
mod switch;

use alloc::{
    format,
    string::{String, ToString},
    vec::Vec,
};

use crate::{
    bindings::LayoutStripper,
    error::{Diagnostics, Phase},
    extensions::{parse_extension_directive, ExtensionSet},
    intrinsics::SamplerLookup,
    pipeline::TranspileOptions,
    tier::{ShaderStage, Tier},
    token::{matching_close, Significant, TokenBuffer, TokenKind},
};

/// A uniform the emitted shader needs but the source never declared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequiredUniform {
    pub name: String,
    pub type_name: &'static str,
    /// Sampler the uniform describes
    pub sampler: String,
}

/// Mutable state shared by the stages of one downgrade.
#[derive(Debug)]
pub struct StageContext<'o> {
    pub stage: ShaderStage,
    pub options: &'o TranspileOptions,
    pub diagnostics: Diagnostics,
    pub extensions: ExtensionSet,
    pub required_uniforms: Vec<RequiredUniform>,
    /// Lines placed before the first declaration, such as default precision
    pub prelude: Vec<String>,
}

impl<'o> StageContext<'o> {
    pub fn new(stage: ShaderStage, options: &'o TranspileOptions) -> Self {
        Self {
            stage,
            options,
            diagnostics: Diagnostics::new(),
            extensions: ExtensionSet::new(),
            required_uniforms: Vec::new(),
            prelude: Vec::new(),
        }
    }

    pub fn error_at(
        &mut self,
        phase: Phase,
        buffer: &TokenBuffer,
        token: usize,
        message: impl Into<String>,
    ) {
        self.diagnostics
            .error(phase, buffer.line(token), buffer.column(token), message);
    }

    pub fn warning_at(
        &mut self,
        phase: Phase,
        buffer: &TokenBuffer,
        token: usize,
        message: impl Into<String>,
    ) {
        self.diagnostics
            .warning(phase, buffer.line(token), buffer.column(token), message);
    }

    /// Record a uniform to declare in the output. Repeated requests for the
    /// same name are ignored.
    pub fn require_uniform(&mut self, name: &str, type_name: &'static str, sampler: &str) {
        if self.required_uniforms.iter().any(|u| u.name == name) {
            return;
        }
        log::debug!("uniform required: {} {}", type_name, name);
        self.required_uniforms.push(RequiredUniform {
            name: name.to_string(),
            type_name,
            sampler: sampler.to_string(),
        });
    }
}

/// Apply every stage between `from` and `to`, highest first.
///
/// `stripper` is consumed by the tier-1 stage; bindings must already have
/// been extracted from `buffer`.
pub fn downgrade(
    buffer: &mut TokenBuffer,
    from: Tier,
    to: Tier,
    lookup: &dyn SamplerLookup,
    stripper: LayoutStripper,
    ctx: &mut StageContext<'_>,
) {
    let mut stripper = Some(stripper);
    let mut tier = from;
    while tier > to {
        let Some(lower) = tier.lower() else {
            break;
        };
        log::debug!("stage {} -> {}", tier, lower);
        let errors = ctx.diagnostics.error_count();
        match tier {
            Tier::Es320 => es320::downgrade(buffer, ctx),
            Tier::Es310 => es310::downgrade(buffer, ctx),
            Tier::Es300 => {
                if let Some(stripper) = stripper.take() {
                    es300::downgrade(buffer, lookup, stripper, ctx);
                }
            }
            Tier::Es100 => {}
        }
        rewrite_version(buffer, lower);
        log::debug!(
            "stage {} -> {} done, {} new errors",
            tier,
            lower,
            ctx.diagnostics.error_count() - errors
        );
        tier = lower;
    }
}

/// Index of the `#version` directive token.
pub fn version_token(buffer: &TokenBuffer) -> Option<usize> {
    (0..buffer.len()).find(|&i| {
        buffer.kind(i) == TokenKind::Directive
            && buffer
                .text(i)
                .trim_start()
                .strip_prefix('#')
                .is_some_and(|rest| rest.trim_start().starts_with("version"))
    })
}

/// Set the `#version` directive to the exact text for `tier`, inserting one
/// at the top if the buffer has none.
pub fn rewrite_version(buffer: &mut TokenBuffer, tier: Tier) -> Option<usize> {
    match version_token(buffer) {
        Some(token) => {
            buffer.replace(token, tier.version_directive());
            Some(token)
        }
        None => {
            buffer.insert_before(0, &format!("{}\n", tier.version_directive()));
            None
        }
    }
}

/// Emit extension directives, the prelude and required uniforms.
///
/// Extensions go right after `#version`. Everything else goes before the
/// first declaration, after any leading directives.
pub fn finish(buffer: &mut TokenBuffer, target: Tier, ctx: &StageContext<'_>) {
    let version = rewrite_version(buffer, target);

    let present: Vec<String> = (0..buffer.len())
        .filter(|&i| buffer.kind(i) == TokenKind::Directive)
        .filter_map(|i| parse_extension_directive(buffer.text(i)).map(|(name, _)| name.to_string()))
        .collect();
    let directives: String = ctx
        .extensions
        .iter()
        .filter(|name| !present.iter().any(|p| p == name))
        .map(|name| format!("\n#extension {} : require", name))
        .collect();
    match version {
        Some(token) if !directives.is_empty() => buffer.insert_after(token, &directives),
        Some(_) => {}
        None => {
            // The inserted `#version` line already ends in a newline.
            let text = format!("{}\n", directives.trim_start_matches('\n'));
            if text.len() > 1 {
                buffer.insert_before(0, &text);
            }
        }
    }

    let mut lines: Vec<String> = ctx.prelude.clone();
    lines.extend(
        ctx.required_uniforms
            .iter()
            .map(|u| format!("uniform {} {};", u.type_name, u.name)),
    );
    if lines.is_empty() {
        return;
    }
    let mut text = lines.join("\n");
    text.push('\n');
    let first = Significant::new(buffer).at(0).unwrap_or(buffer.len());
    if first == buffer.len() && version.is_some() {
        text.insert(0, '\n');
    }
    // Ahead of declaration text a stage inserted at the same token, but after
    // extension lines.
    if version.is_some_and(|token| token + 1 == first) {
        buffer.insert_before(first, &text);
    } else {
        buffer.insert_front(first, &text);
    }
}

/// A call `name(...)` located by token indices.
#[derive(Debug, Clone, Copy)]
pub(crate) struct CallSite {
    pub name: usize,
    pub open: usize,
    pub close: usize,
}

/// Every call to a built-in function accepted by `pred`.
pub(crate) fn find_calls(buffer: &TokenBuffer, pred: impl Fn(&str) -> bool) -> Vec<CallSite> {
    let sig = Significant::new(buffer);
    let mut calls = Vec::new();
    for (k, name) in sig.iter().enumerate() {
        if buffer.kind(name) != TokenKind::BuiltinFunction || !pred(buffer.text(name)) {
            continue;
        }
        let Some(open) = sig.at(k + 1).filter(|&t| buffer.is(t, "(")) else {
            continue;
        };
        if let Some(close) = matching_close(buffer, open) {
            calls.push(CallSite { name, open, close });
        }
    }
    calls
}

/// Replace a whole call with `text`.
pub(crate) fn replace_call(buffer: &mut TokenBuffer, call: CallSite, kind: TokenKind, text: &str) {
    buffer.take_range_text(call.open..call.close + 1);
    buffer.remove_range(call.open..call.close + 1);
    buffer.replace_with_kind(call.name, kind, text);
}

/// Remove a call together with the `;` ending its statement.
pub(crate) fn remove_call_statement(buffer: &mut TokenBuffer, call: CallSite) {
    let sig = Significant::new(buffer);
    let end = match sig.next_after(call.close) {
        Some(semi) if buffer.is(semi, ";") => semi + 1,
        _ => call.close + 1,
    };
    buffer.take_range_text(call.name..end);
    scan::remove_tidy(buffer, call.name..end);
}

/// Remove the statement starting at `token`, through its `;`.
pub(crate) fn remove_statement_from(buffer: &mut TokenBuffer, token: usize) {
    let mut depth = 0usize;
    for index in token..buffer.len() {
        if buffer.kind(index) != TokenKind::Punctuation {
            continue;
        }
        match buffer.text(index) {
            "(" | "[" | "{" => depth += 1,
            ")" | "]" | "}" => depth = depth.saturating_sub(1),
            ";" if depth == 0 => {
                buffer.take_range_text(token..index + 1);
                scan::remove_tidy(buffer, token..index + 1);
                return;
            }
            _ => {}
        }
    }
}

/// Significant tokens whose text is `name` and whose kind is `kind`.
pub(crate) fn tokens_named(buffer: &TokenBuffer, kind: TokenKind, name: &str) -> Vec<usize> {
    (0..buffer.len())
        .filter(|&i| buffer.kind(i) == kind && buffer.text(i) == name)
        .collect()
}

/// Whether the significant token after `token` is an assignment `=`.
pub(crate) fn is_assigned(buffer: &TokenBuffer, token: usize) -> bool {
    Significant::new(buffer)
        .next_after(token)
        .is_some_and(|next| buffer.is(next, "="))
}
