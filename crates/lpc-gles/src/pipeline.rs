//! Transpilation entry point and the degrade ladder.
//!
//! A call always returns output for a valid request. When a step cannot run
//! precisely the pipeline drops to a less precise mode instead of failing:
//! full analysis, partial analysis, token-only rewriting, and finally a
//! line-based textual rewrite.

use alloc::{
    format,
    string::{String, ToString},
    vec::Vec,
};
use core::fmt;

use crate::{
    analyze::{analyze, Analysis, Precision},
    bindings::{extract_bindings, BindingTable},
    downgrade::{downgrade, finish, rewrite_version, RequiredUniform, StageContext},
    error::{Diagnostic, Diagnostics, Phase, TranspileError, TranspileResult},
    extensions::ExtensionSet,
    intrinsics::{DeclaredSamplers, SamplerLookup},
    preprocess::{preprocess, IncludeResolver, PreprocessOptions},
    textual,
    tier::{detect_tier, ShaderStage, Tier},
    token::{TokenBuffer, Tokenizer},
};

/// How precisely the pipeline could work, most precise first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PipelineMode {
    /// Analysis found no errors
    Full,
    /// Analysis errors stayed within `max_analysis_errors`
    Partial,
    /// Token rewrites without a symbol table
    TokenOnly,
    /// Line-based rewrites; the tokenizer could not run
    Textual,
}

impl PipelineMode {
    pub fn name(self) -> &'static str {
        match self {
            PipelineMode::Full => "full",
            PipelineMode::Partial => "partial",
            PipelineMode::TokenOnly => "token-only",
            PipelineMode::Textual => "textual",
        }
    }
}

impl fmt::Display for PipelineMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Pipeline configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranspileOptions {
    pub max_include_depth: usize,
    /// Analysis errors tolerated before dropping to token-only mode
    pub max_analysis_errors: usize,
    /// Token count beyond which tokenization is treated as failed
    pub max_tokens: usize,
    /// Start the degrade ladder at this mode
    pub force_mode: Option<PipelineMode>,
    /// Default float precision injected into fragment shaders
    pub fragment_precision: Precision,
    /// Suffix of the texture-size uniform used to approximate `texelFetch`
    pub texture_size_suffix: String,
}

impl Default for TranspileOptions {
    fn default() -> Self {
        Self {
            max_include_depth: 32,
            max_analysis_errors: 16,
            max_tokens: 1_048_576,
            force_mode: None,
            fragment_precision: Precision::Mediump,
            texture_size_suffix: String::from("_TextureSize"),
        }
    }
}

impl TranspileOptions {
    pub fn with_max_include_depth(mut self, depth: usize) -> Self {
        self.max_include_depth = depth;
        self
    }

    pub fn with_max_analysis_errors(mut self, count: usize) -> Self {
        self.max_analysis_errors = count;
        self
    }

    pub fn with_max_tokens(mut self, count: usize) -> Self {
        self.max_tokens = count;
        self
    }

    pub fn with_force_mode(mut self, mode: PipelineMode) -> Self {
        self.force_mode = Some(mode);
        self
    }

    pub fn with_fragment_precision(mut self, precision: Precision) -> Self {
        self.fragment_precision = precision;
        self
    }

    pub fn with_texture_size_suffix(mut self, suffix: &str) -> Self {
        self.texture_size_suffix = suffix.to_string();
        self
    }
}

/// Inputs of one transpilation.
#[derive(Debug, Clone)]
pub struct TranspileRequest<'a> {
    pub source: &'a str,
    /// Name used in diagnostics and for relative includes
    pub file_name: &'a str,
    pub stage: ShaderStage,
    /// Detected from `#version` when `None`
    pub source_tier: Option<Tier>,
    pub target_tier: Tier,
    /// Extra macros as `(name, replacement)`
    pub predefined: Vec<(String, String)>,
}

impl<'a> TranspileRequest<'a> {
    pub fn new(source: &'a str, stage: ShaderStage, target_tier: Tier) -> Self {
        Self {
            source,
            file_name: "<shader>",
            stage,
            source_tier: None,
            target_tier,
            predefined: Vec::new(),
        }
    }

    pub fn with_file_name(mut self, file_name: &'a str) -> Self {
        self.file_name = file_name;
        self
    }

    pub fn with_source_tier(mut self, tier: Tier) -> Self {
        self.source_tier = Some(tier);
        self
    }

    pub fn with_macro(mut self, name: &str, replacement: &str) -> Self {
        self.predefined
            .push((name.to_string(), replacement.to_string()));
        self
    }
}

/// Result of one transpilation.
#[derive(Debug, Clone)]
pub struct TranspileOutput {
    pub source: String,
    pub diagnostics: Diagnostics,
    /// Extensions the emitted source requires
    pub extensions: ExtensionSet,
    /// Locations to bind before linking
    pub bindings: BindingTable,
    pub mode: PipelineMode,
    /// Uniforms the caller must supply, such as texture sizes
    pub required_uniforms: Vec<RequiredUniform>,
    pub source_tier: Tier,
    pub target_tier: Tier,
}

impl TranspileOutput {
    /// Changes that alter the shader's behavior.
    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.errors()
    }

    /// Informational changes.
    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.warnings()
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics.has_errors()
    }
}

/// Transpiler for one shader at a time.
///
/// Holds no state between calls; use one instance per concurrent compilation.
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    options: TranspileOptions,
}

impl Pipeline {
    pub fn new(options: TranspileOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &TranspileOptions {
        &self.options
    }

    /// Transpile one shader.
    ///
    /// Fails only for requests that cannot be satisfied: an upgrade, or a
    /// stage that does not exist at the target tier. Problems in the shader
    /// itself are reported through [`TranspileOutput::diagnostics`].
    pub fn transpile(
        &self,
        request: &TranspileRequest<'_>,
        resolver: &mut dyn IncludeResolver,
    ) -> TranspileResult<TranspileOutput> {
        let mut diagnostics = Diagnostics::new();
        let source_tier = match request.source_tier {
            Some(tier) => tier,
            None => detect_tier(request.source).unwrap_or_else(|| {
                diagnostics.warning(
                    Phase::Preprocess,
                    1,
                    1,
                    "unrecognized #version directive; assuming GLSL ES 1.00",
                );
                Tier::Es100
            }),
        };
        let target = request.target_tier;
        if target > source_tier {
            return Err(TranspileError::Upgrade {
                from: source_tier,
                to: target,
            });
        }
        let minimum = request.stage.minimum_tier();
        if target < minimum {
            return Err(TranspileError::UnsupportedStage {
                stage: request.stage,
                minimum,
            });
        }
        log::debug!(
            "transpiling {} ({} shader) from {} to {}",
            request.file_name,
            request.stage.name(),
            source_tier,
            target
        );

        let raw = Tokenizer::with_limit(request.source, self.options.max_tokens).tokenize();
        let mut mode = self.options.force_mode.unwrap_or(PipelineMode::Full);
        let raw = match raw {
            Ok((buffer, tokenize_diagnostics)) => {
                diagnostics.extend(tokenize_diagnostics);
                Some(buffer)
            }
            Err(err) => {
                degrade(&mut mode, PipelineMode::Textual, &err.to_string(), &mut diagnostics);
                None
            }
        };

        if source_tier == target {
            return Ok(self.normalize(request, raw, mode, diagnostics, source_tier));
        }

        let options = PreprocessOptions {
            stage: request.stage,
            version: source_tier.version_number(),
            max_include_depth: self.options.max_include_depth,
            predefined: request.predefined.clone(),
        };
        let preprocessed = preprocess(request.source, request.file_name, options, resolver);
        diagnostics.extend(preprocessed.diagnostics);

        let mut ctx = StageContext::new(request.stage, &self.options);
        let mut buffer = None;
        if mode < PipelineMode::Textual {
            match Tokenizer::with_limit(&preprocessed.text, self.options.max_tokens).tokenize() {
                // Tokenizer diagnostics were already reported against the raw source.
                Ok((tokens, _)) => buffer = Some(tokens),
                Err(err) => {
                    degrade(&mut mode, PipelineMode::Textual, &err.to_string(), &mut diagnostics)
                }
            }
        }

        let analysis = match &buffer {
            Some(tokens) if mode <= PipelineMode::Partial => {
                let analysis = analyze(tokens, request.stage);
                self.rank_analysis(&analysis, &mut mode, &mut diagnostics);
                Some(analysis)
            }
            _ => None,
        };
        if let Some(analysis) = &analysis {
            diagnostics.extend(analysis.diagnostics.clone());
        }

        let (source, bindings) = match (mode, buffer, &analysis) {
            (PipelineMode::Full | PipelineMode::Partial, Some(mut tokens), Some(analysis)) => {
                let bindings = self.rewrite(&mut tokens, source_tier, target, &analysis.symbols, &mut ctx);
                (tokens.render(), bindings)
            }
            (PipelineMode::Textual, _, _) | (_, None, _) => {
                textual::transpile(&preprocessed.text, source_tier, target, &mut ctx)
            }
            (_, Some(mut tokens), _) => {
                let declared = DeclaredSamplers::scan(&tokens);
                let bindings = self.rewrite(&mut tokens, source_tier, target, &declared, &mut ctx);
                (tokens.render(), bindings)
            }
        };

        diagnostics.extend(ctx.diagnostics);
        log::debug!(
            "{} finished in {} mode: {} errors, {} warnings",
            request.file_name,
            mode,
            diagnostics.error_count(),
            diagnostics.warning_count()
        );
        Ok(TranspileOutput {
            source,
            diagnostics,
            extensions: ctx.extensions,
            bindings,
            mode,
            required_uniforms: ctx.required_uniforms,
            source_tier,
            target_tier: target,
        })
    }

    /// Step down from full analysis according to the analysis error count.
    fn rank_analysis(
        &self,
        analysis: &Analysis,
        mode: &mut PipelineMode,
        diagnostics: &mut Diagnostics,
    ) {
        let errors = analysis.error_count();
        if errors > self.options.max_analysis_errors {
            let reason = format!(
                "{} analysis errors exceed the limit of {}",
                errors, self.options.max_analysis_errors
            );
            degrade(mode, PipelineMode::TokenOnly, &reason, diagnostics);
        } else if errors > 0 {
            let reason = format!("{} analysis errors", errors);
            degrade(mode, PipelineMode::Partial, &reason, diagnostics);
        }
    }

    fn rewrite(
        &self,
        tokens: &mut TokenBuffer,
        from: Tier,
        to: Tier,
        lookup: &dyn SamplerLookup,
        ctx: &mut StageContext<'_>,
    ) -> BindingTable {
        let (bindings, stripper) = extract_bindings(tokens, ctx.stage, &mut ctx.diagnostics);
        downgrade(tokens, from, to, lookup, stripper, ctx);
        finish(tokens, to, ctx);
        bindings
    }

    /// Same source and target tier: only the version directive is normalized.
    fn normalize(
        &self,
        request: &TranspileRequest<'_>,
        raw: Option<TokenBuffer>,
        mode: PipelineMode,
        mut diagnostics: Diagnostics,
        tier: Tier,
    ) -> TranspileOutput {
        let (source, bindings) = match raw {
            Some(mut tokens) => {
                let (bindings, _) = extract_bindings(&tokens, request.stage, &mut diagnostics);
                rewrite_version(&mut tokens, tier);
                (tokens.render(), bindings)
            }
            None => (
                textual::rewrite_version(request.source, tier),
                BindingTable::default(),
            ),
        };
        TranspileOutput {
            source,
            diagnostics,
            extensions: ExtensionSet::new(),
            bindings,
            mode,
            required_uniforms: Vec::new(),
            source_tier: tier,
            target_tier: tier,
        }
    }
}

/// Move down the ladder to `to`, never back up.
fn degrade(mode: &mut PipelineMode, to: PipelineMode, reason: &str, diagnostics: &mut Diagnostics) {
    if *mode >= to {
        return;
    }
    log::warn!("falling back from {} to {} mode: {}", mode, to, reason);
    let phase = if to == PipelineMode::Textual {
        Phase::Tokenize
    } else {
        Phase::Analyze
    };
    diagnostics.warning(
        phase,
        0,
        0,
        format!("falling back to {} mode: {}", to, reason),
    );
    *mode = to;
}

/// Transpile with default options and no include support.
pub fn transpile(
    source: &str,
    stage: ShaderStage,
    target: Tier,
) -> TranspileResult<TranspileOutput> {
    Pipeline::default().transpile(
        &TranspileRequest::new(source, stage, target),
        &mut crate::preprocess::NoIncludes,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const FRAGMENT: &str = "#version 300 es\nprecision mediump float;\nin vec2 uv;\nuniform sampler2D tex;\nout vec4 color;\nvoid main() { color = texture(tex, uv); }\n";

    #[test]
    fn test_upgrade_rejected() {
        let err = transpile("#version 100\nvoid main() {}", ShaderStage::Fragment, Tier::Es300)
            .unwrap_err();
        assert_eq!(
            err,
            TranspileError::Upgrade {
                from: Tier::Es100,
                to: Tier::Es300
            }
        );
    }

    #[test]
    fn test_stage_rejected() {
        let err = transpile(
            "#version 320 es\nvoid main() {}",
            ShaderStage::Geometry,
            Tier::Es310,
        )
        .unwrap_err();
        assert!(matches!(err, TranspileError::UnsupportedStage { minimum: Tier::Es320, .. }));

        let err = transpile("#version 310 es\nvoid main() {}", ShaderStage::Compute, Tier::Es300)
            .unwrap_err();
        assert!(matches!(err, TranspileError::UnsupportedStage { minimum: Tier::Es310, .. }));
    }

    #[test]
    fn test_same_tier_is_untouched() {
        let output = transpile(FRAGMENT, ShaderStage::Fragment, Tier::Es300).unwrap();
        assert_eq!(output.source, FRAGMENT);
        assert_eq!(output.mode, PipelineMode::Full);
        assert!(output.diagnostics.is_empty());
    }

    #[test]
    fn test_full_mode() {
        let output = transpile(FRAGMENT, ShaderStage::Fragment, Tier::Es100).unwrap();
        assert_eq!(output.mode, PipelineMode::Full);
        assert!(output.source.starts_with("#version 100\n"));
        assert!(output.source.contains("gl_FragColor = texture2D(tex, uv);"));
        assert!(!output.has_errors());
    }

    #[test]
    fn test_analysis_errors_degrade() {
        let source = "#version 300 es\nprecision mediump float;\nmystery a;\nuniform sampler2D tex;\nvoid main() { gl_FragColor = texture(tex, vec2(0.0)); }";
        let output = transpile(source, ShaderStage::Fragment, Tier::Es100).unwrap();
        assert_eq!(output.mode, PipelineMode::Partial);
        assert!(output.source.contains("texture2D(tex"));

        let pipeline = Pipeline::new(TranspileOptions::default().with_max_analysis_errors(0));
        let output = pipeline
            .transpile(
                &TranspileRequest::new(source, ShaderStage::Fragment, Tier::Es100),
                &mut crate::preprocess::NoIncludes,
            )
            .unwrap();
        assert_eq!(output.mode, PipelineMode::TokenOnly);
        assert!(output.source.contains("texture2D(tex"));
        assert!(output.diagnostics.contains_message("falling back to token-only mode"));
    }

    #[test]
    fn test_token_limit_falls_back_to_textual() {
        let pipeline = Pipeline::new(TranspileOptions::default().with_max_tokens(8));
        let output = pipeline
            .transpile(
                &TranspileRequest::new(FRAGMENT, ShaderStage::Fragment, Tier::Es100),
                &mut crate::preprocess::NoIncludes,
            )
            .unwrap();
        assert_eq!(output.mode, PipelineMode::Textual);
        assert!(output.source.starts_with("#version 100\n"));
        assert!(output.source.contains("varying vec2 uv;"));
    }

    #[test]
    fn test_forced_mode_never_climbs() {
        let pipeline =
            Pipeline::new(TranspileOptions::default().with_force_mode(PipelineMode::TokenOnly));
        let output = pipeline
            .transpile(
                &TranspileRequest::new(FRAGMENT, ShaderStage::Fragment, Tier::Es100),
                &mut crate::preprocess::NoIncludes,
            )
            .unwrap();
        assert_eq!(output.mode, PipelineMode::TokenOnly);
        assert!(output.source.contains("texture2D(tex, uv)"));
    }
}
