//! swc-backed transformer: parsing, diagnostics and printing.

use std::iter::Peekable;
use std::str::Chars;
use std::thread;

use swc_core::common::{sync::Lrc, FileName, SourceMap, Spanned};
use swc_core::ecma::ast::{
    ArrowExpr, AwaitExpr, Constructor, EsVersion, ForOfStmt, Function, Module, Program,
};
use swc_core::ecma::codegen::{text_writer::JsWriter, Config as CodegenConfig, Emitter};
use swc_core::ecma::parser::{error::Error as ParseError, lexer::Lexer, Parser, StringInput, Syntax};
use swc_core::ecma::visit::{Visit, VisitWith};

use crate::transform::error::{Diagnostic, TransformError, STDIN_NAME};
use crate::transform::lower::{plain_module, Lowered, Lowerer};
use crate::transform::{Format, TransformOptions, Transformer};

/// Deepest bracket nesting accepted before parsing.
pub const MAX_NESTING_DEPTH: usize = 512;

/// Stack reserved for the thread that parses, lowers and prints one source.
/// The parser, printer and AST drop all recurse once per nesting level.
const TRANSFORM_STACK_SIZE: usize = 256 * 1024 * 1024;

/// Transformer built on the swc parser and code generator.
///
/// Every call gets a fresh `SourceMap` on its own large-stack thread, so calls
/// share nothing and deep input cannot exhaust the caller's stack.
#[derive(Debug, Clone, Copy, Default)]
pub struct SwcTransformer;

impl Transformer for SwcTransformer {
    fn transform(&self, source: &str, options: &TransformOptions) -> Result<Vec<u8>, TransformError> {
        check_nesting(source)?;

        thread::scope(|scope| {
            let worker = thread::Builder::new()
                .name("swc-transform".to_string())
                .stack_size(TRANSFORM_STACK_SIZE)
                .spawn_scoped(scope, || transform_source(source, options))
                .map_err(|e| {
                    TransformError::Internal(format!("failed to start transform thread: {}", e))
                })?;
            worker
                .join()
                .map_err(|_| TransformError::Internal("transform thread panicked".to_string()))?
        })
    }
}

fn transform_source(source: &str, options: &TransformOptions) -> Result<Vec<u8>, TransformError> {
    let cm: Lrc<SourceMap> = Default::default();
    let program = parse_source(&cm, source).map_err(TransformError::Syntax)?;

    if options.format != Format::Esm && has_top_level_await(&program) {
        return Err(TransformError::Unsupported(format!(
            "top-level await is not supported with the \"{}\" output format",
            options.format
        )));
    }

    let module = match (options.format, program) {
        (Format::Esm, Program::Module(module)) => module,
        (Format::Esm, Program::Script(script)) => plain_module(&cm, script.body)?,
        (format, Program::Module(module)) => Lowerer::new(&cm)
            .lower(module)?
            .into_module(&cm, format, &options.global_name)?,
        (format, Program::Script(script)) => {
            Lowered::script(script.body).into_module(&cm, format, &options.global_name)?
        }
    };

    emit(&cm, &module, options.minify)
}

/// Parse submitted source, as a module when possible.
///
/// Code that is only valid in sloppy mode (`with`, legacy octal literals) is
/// accepted as a script. When neither parse succeeds the module diagnostics
/// are reported.
fn parse_source(cm: &Lrc<SourceMap>, source: &str) -> Result<Program, Vec<Diagnostic>> {
    let module_errors = match parse_module(cm, STDIN_NAME, source.to_string()) {
        Ok(module) => return Ok(Program::Module(module)),
        Err(diagnostics) => diagnostics,
    };
    parse_with(cm, STDIN_NAME, source.to_string(), |parser| parser.parse_script())
        .map(Program::Script)
        .map_err(|_| module_errors)
}

/// Parse `source` as an ES module.
pub(crate) fn parse_module(
    cm: &Lrc<SourceMap>,
    name: &str,
    source: String,
) -> Result<Module, Vec<Diagnostic>> {
    parse_with(cm, name, source, |parser| parser.parse_module())
}

/// Recoverable errors count as failures too; the result is either a clean
/// tree or every diagnostic the parser produced, ordered by position.
fn parse_with<T>(
    cm: &Lrc<SourceMap>,
    name: &str,
    source: String,
    parse: impl FnOnce(&mut Parser<Lexer<'_>>) -> Result<T, ParseError>,
) -> Result<T, Vec<Diagnostic>> {
    let fm = cm.new_source_file(FileName::Custom(name.to_string()), source);
    let lexer = Lexer::new(
        Syntax::Es(Default::default()),
        EsVersion::EsNext,
        StringInput::from(&*fm),
        None,
    );
    let mut parser = Parser::new_from(lexer);
    let result = parse(&mut parser);
    let mut errors = parser.take_errors();

    match result {
        Ok(tree) if errors.is_empty() => return Ok(tree),
        Ok(_) => {}
        Err(fatal) => errors.push(fatal),
    }

    let mut diagnostics: Vec<Diagnostic> = errors.iter().map(|e| diagnostic(cm, e)).collect();
    diagnostics.sort_by(|a, b| (a.line, a.column).cmp(&(b.line, b.column)));
    diagnostics.dedup();
    Err(diagnostics)
}

fn diagnostic(cm: &Lrc<SourceMap>, error: &ParseError) -> Diagnostic {
    let loc = cm.lookup_char_pos(error.span().lo);
    Diagnostic {
        line: loc.line,
        column: loc.col_display + 1,
        message: error.kind().msg().into_owned(),
    }
}

/// Reject sources whose brackets nest deeper than [`MAX_NESTING_DEPTH`].
///
/// Strings, comments and template text are skipped; `${` inside a template
/// counts as one level. Regular expression literals are not recognized.
fn check_nesting(source: &str) -> Result<(), TransformError> {
    NestingScanner::new(source).run()
}

enum TemplateEnd {
    Closed,
    Interpolation,
}

struct NestingScanner<'a> {
    chars: Peekable<Chars<'a>>,
    line: usize,
    column: usize,
    depth: usize,
    /// Depth at which each open `${` resumes its template.
    templates: Vec<usize>,
}

impl<'a> NestingScanner<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            chars: source.chars().peekable(),
            line: 1,
            column: 0,
            depth: 0,
            templates: Vec::new(),
        }
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        if c == '\n' {
            self.line += 1;
            self.column = 0;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn run(mut self) -> Result<(), TransformError> {
        while let Some(c) = self.bump() {
            match c {
                '(' | '[' | '{' => self.open()?,
                ')' | ']' => self.depth = self.depth.saturating_sub(1),
                '}' => {
                    if self.templates.last() == Some(&self.depth) {
                        self.templates.pop();
                        self.depth -= 1;
                        self.resume_template()?;
                    } else {
                        self.depth = self.depth.saturating_sub(1);
                    }
                }
                '\'' | '"' => self.skip_string(c),
                '`' => self.resume_template()?,
                '/' => match self.chars.peek().copied() {
                    Some('/') => self.skip_line(),
                    Some('*') => self.skip_block_comment(),
                    _ => {}
                },
                _ => {}
            }
        }
        Ok(())
    }

    fn open(&mut self) -> Result<(), TransformError> {
        self.depth += 1;
        if self.depth > MAX_NESTING_DEPTH {
            return Err(TransformError::TooDeep(Diagnostic {
                line: self.line,
                column: self.column,
                message: format!("nesting exceeds the maximum depth of {}", MAX_NESTING_DEPTH),
            }));
        }
        Ok(())
    }

    fn resume_template(&mut self) -> Result<(), TransformError> {
        if let TemplateEnd::Interpolation = self.skip_template() {
            self.open()?;
            self.templates.push(self.depth);
        }
        Ok(())
    }

    fn skip_template(&mut self) -> TemplateEnd {
        while let Some(c) = self.bump() {
            match c {
                '\\' => {
                    self.bump();
                }
                '`' => return TemplateEnd::Closed,
                '$' if self.chars.peek() == Some(&'{') => {
                    self.bump();
                    return TemplateEnd::Interpolation;
                }
                _ => {}
            }
        }
        TemplateEnd::Closed
    }

    fn skip_string(&mut self, quote: char) {
        while let Some(c) = self.bump() {
            match c {
                '\\' => {
                    self.bump();
                }
                '\n' => return,
                c if c == quote => return,
                _ => {}
            }
        }
    }

    fn skip_line(&mut self) {
        while let Some(&c) = self.chars.peek() {
            if c == '\n' {
                return;
            }
            self.bump();
        }
    }

    fn skip_block_comment(&mut self) {
        self.bump();
        while let Some(c) = self.bump() {
            if c == '*' && self.chars.peek() == Some(&'/') {
                self.bump();
                return;
            }
        }
    }
}

/// Print a module with the swc code generator.
pub(crate) fn emit(
    cm: &Lrc<SourceMap>,
    module: &Module,
    minify: bool,
) -> Result<Vec<u8>, TransformError> {
    let mut buf = Vec::new();
    {
        let writer = JsWriter::new(cm.clone(), "\n", &mut buf, None);
        let mut emitter = Emitter {
            cfg: CodegenConfig::default()
                .with_target(EsVersion::EsNext)
                .with_minify(minify),
            cm: cm.clone(),
            comments: None,
            wr: writer,
        };
        emitter.emit_module(module)?;
    }
    Ok(buf)
}

/// Finds `await` that is not nested inside any function body.
#[derive(Default)]
struct TopLevelAwait {
    found: bool,
}

impl Visit for TopLevelAwait {
    fn visit_function(&mut self, _: &Function) {}

    fn visit_arrow_expr(&mut self, _: &ArrowExpr) {}

    fn visit_constructor(&mut self, _: &Constructor) {}

    fn visit_await_expr(&mut self, _: &AwaitExpr) {
        self.found = true;
    }

    fn visit_for_of_stmt(&mut self, n: &ForOfStmt) {
        if n.is_await {
            self.found = true;
        } else {
            n.visit_children_with(self);
        }
    }
}

fn has_top_level_await(program: &Program) -> bool {
    let mut finder = TopLevelAwait::default();
    program.visit_with(&mut finder);
    finder.found
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(source: &str, options: &TransformOptions) -> Result<String, TransformError> {
        SwcTransformer
            .transform(source, options)
            .map(|bytes| String::from_utf8(bytes).unwrap())
    }

    fn iife(source: &str) -> String {
        run(source, &TransformOptions::default()).unwrap()
    }

    #[test]
    fn test_statement_is_wrapped_in_iife() {
        let out = iife("const x=1;");

        assert!(out.starts_with("var exports = ("), "got: {out}");
        assert!(out.contains("=>"));
        assert!(out.contains("const x = 1;"));
        assert!(out.trim_end().ends_with("})();"));
        // No exports means nothing is returned and no helpers are emitted.
        assert!(!out.contains("return"));
        assert!(!out.contains("__defProp"));
    }

    #[test]
    fn test_empty_source_yields_empty_iife() {
        let out = iife("");
        assert!(out.starts_with("var exports = ("));
        assert!(out.trim_end().ends_with("})();"));
        assert!(!out.contains("__exports"));
    }

    #[test]
    fn test_output_is_deterministic() {
        let source = "export const a = 1; export default function () { return a; }";
        assert_eq!(iife(source), iife(source));
    }

    #[test]
    fn test_empty_global_name_emits_bare_iife() {
        let options = TransformOptions {
            global_name: String::new(),
            ..TransformOptions::default()
        };
        let out = run("let y = 2;", &options).unwrap();
        assert!(out.starts_with("(("), "got: {out}");
        assert!(!out.contains("var exports"));
    }

    #[test]
    fn test_dotted_global_name_creates_parents() {
        let options = TransformOptions {
            global_name: "lib.parser".into(),
            ..TransformOptions::default()
        };
        let out = run("export const x = 1;", &options).unwrap();
        assert!(out.contains("var lib = lib || {};"), "got: {out}");
        assert!(out.contains("lib.parser = (("));
        assert!(out.contains("return __exports;"));
    }

    #[test]
    fn test_syntax_error_reports_position() {
        let err = run("const = 1;", &TransformOptions::default()).unwrap_err();
        match err {
            TransformError::Syntax(diagnostics) => {
                assert!(!diagnostics.is_empty());
                assert_eq!(diagnostics[0].line, 1);
                assert!(diagnostics[0].column >= 1);
            }
            other => panic!("expected syntax error, got {other:?}"),
        }
    }

    #[test]
    fn test_multiline_error_line_numbers() {
        let err = run("let a = 1;\nlet b = ;\n", &TransformOptions::default()).unwrap_err();
        let TransformError::Syntax(diagnostics) = err else {
            panic!("expected syntax error");
        };
        assert_eq!(diagnostics[0].line, 2);
    }

    #[test]
    fn test_top_level_await_rejected_for_iife() {
        let err = run("await fetch('/x');", &TransformOptions::default()).unwrap_err();
        assert!(matches!(err, TransformError::Unsupported(_)));
    }

    #[test]
    fn test_nested_await_is_allowed() {
        let out = iife("async function load() { await fetch('/x'); }");
        assert!(out.contains("await fetch"));
    }

    #[test]
    fn test_esm_format_keeps_module_syntax() {
        let options = TransformOptions {
            format: Format::Esm,
            ..TransformOptions::default()
        };
        let out = run("export const a = await Promise.resolve(1);", &options).unwrap();
        assert!(out.contains("export const a"), "got: {out}");
        assert!(!out.contains("var exports"));
    }

    #[test]
    fn test_sloppy_mode_scripts_are_wrapped() {
        let out = iife("with (Math) { console.log(PI); }");
        assert!(out.starts_with("var exports = ("), "got: {out}");
        assert!(out.contains("with"));
        assert!(out.contains("console.log(PI)"));

        let out = iife("var x = 010;");
        assert!(out.contains("var x ="), "got: {out}");
        assert!(!out.contains("return"));
    }

    #[test]
    fn test_script_keeps_module_diagnostics_when_both_fail() {
        let err = run("import x from 'y'; with (x) {}", &TransformOptions::default()).unwrap_err();
        let TransformError::Syntax(diagnostics) = err else {
            panic!("expected syntax error");
        };
        assert!(!diagnostics.is_empty());
    }

    #[test]
    fn test_deep_nesting_is_rejected_with_position() {
        let depth = MAX_NESTING_DEPTH + 88;
        let source = format!("x = {}0{};", "[".repeat(depth), "]".repeat(depth));

        let err = run(&source, &TransformOptions::default()).unwrap_err();
        let TransformError::TooDeep(at) = &err else {
            panic!("expected nesting error, got {err:?}");
        };
        assert_eq!(at.line, 1);
        assert_eq!(at.column, 4 + MAX_NESTING_DEPTH + 1);
        assert!(err.report().starts_with("<stdin>:1:"));
    }

    #[test]
    fn test_nesting_at_the_limit_transforms() {
        let depth = MAX_NESTING_DEPTH;
        let source = format!("x = {}0{};", "[".repeat(depth), "]".repeat(depth));
        let out = iife(&source);
        assert!(out.starts_with("var exports = ("));
    }

    #[test]
    fn test_long_unary_chains_do_not_exhaust_the_stack() {
        let source = format!("x = {}y;", "!".repeat(1000));
        let out = iife(&source);
        assert!(out.contains("!!!!y"));
    }

    #[test]
    fn test_brackets_in_strings_and_comments_are_ignored() {
        let noise = "(".repeat(MAX_NESTING_DEPTH * 2);
        let source = format!(
            "const a = \"{noise}\";\nconst b = '{noise}';\n// {noise}\n/* {noise} */\nconst c = `{noise}${{a}}{noise}`;"
        );
        assert!(SwcTransformer.transform(&source, &TransformOptions::default()).is_ok());
    }

    #[test]
    fn test_template_interpolations_count_as_nesting() {
        let depth = MAX_NESTING_DEPTH + 1;
        let source = format!("x = {}0{};", "`${".repeat(depth), "}`".repeat(depth));
        let err = run(&source, &TransformOptions::default()).unwrap_err();
        assert!(matches!(err, TransformError::TooDeep(_)), "got {err:?}");
    }

    #[test]
    fn test_minify_strips_whitespace() {
        let options = TransformOptions {
            minify: true,
            ..TransformOptions::default()
        };
        let pretty = iife("const value = 1;\nconsole.log(value);");
        let minified = run("const value = 1;\nconsole.log(value);", &options).unwrap();
        assert!(minified.len() < pretty.len());
        assert!(minified.contains("console.log(value)"));
    }
}
