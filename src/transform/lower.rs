//! Lowering of ES module syntax into IIFE or CommonJS shape.
//!
//! Imports become `require()` calls and exports become getters on a namespace
//! object (`__exports`). Lowered imports are hoisted ahead of the body, since
//! a module's dependencies evaluate before it does. The getters are installed before the module body
//! runs, so exported `let` bindings stay live. Wrapper code and helper
//! functions are written as JavaScript text and parsed with the same parser as
//! the submitted source; only the user's own statements are moved between
//! trees.

use swc_core::common::{sync::Lrc, SourceMap};
use swc_core::ecma::ast::{
    ArrowExpr, AssignExpr, AssignPatProp, BindingIdent, BlockStmtOrExpr, CallExpr, Callee,
    ClassExpr, Decl, DefaultDecl, Expr, ExprStmt, FnExpr, ImportDecl, ImportSpecifier, Module,
    ModuleDecl, ModuleExportName, ModuleItem, NamedExport, ExportSpecifier, ParenExpr, Pat, Stmt,
    VarDeclarator,
};
use swc_core::ecma::visit::{Visit, VisitWith};

use crate::transform::error::TransformError;
use crate::transform::swc::parse_module;
use crate::transform::{is_identifier, Format};

/// Name of the namespace object holding the module's exports.
pub const NAMESPACE: &str = "__exports";

/// Binding used for `export default <expr>` and anonymous default declarations.
pub const DEFAULT_BINDING: &str = "__default";

const BODY_MARKER: &str = "__BODY__";

const HELPER_DEF_PROP: &str = "var __defProp = Object.defineProperty;\n";

const HELPER_EXPORT: &str = "var __export = (target, all) => {
  for (var name in all) __defProp(target, name, { get: all[name], enumerable: true });
};\n";

const HELPER_RE_EXPORT: &str = "var __reExport = (target, mod) => {
  for (const key in mod)
    if (key !== \"default\" && !Object.prototype.hasOwnProperty.call(target, key))
      __defProp(target, key, { get: () => mod[key], enumerable: true });
  return target;
};\n";

const HELPER_IMPORT_DEFAULT: &str =
    "var __importDefault = (mod) => mod && mod.__esModule ? mod.default : mod;\n";

/// Rewrites the items of one module into plain statements.
pub struct Lowerer<'a> {
    cm: &'a Lrc<SourceMap>,
    /// `require()` bindings, placed before `body`.
    imports: Vec<Stmt>,
    body: Vec<Stmt>,
    /// `(exported name, getter expression)` in source order.
    exports: Vec<(String, String)>,
    re_exports: bool,
    import_default: bool,
    next_import: usize,
}

/// A module whose import/export syntax has been rewritten.
pub struct Lowered {
    body: Vec<Stmt>,
    exports: Vec<(String, String)>,
    re_exports: bool,
    import_default: bool,
}

impl<'a> Lowerer<'a> {
    pub fn new(cm: &'a Lrc<SourceMap>) -> Self {
        Self {
            cm,
            imports: Vec::new(),
            body: Vec::new(),
            exports: Vec::new(),
            re_exports: false,
            import_default: false,
            next_import: 0,
        }
    }

    pub fn lower(mut self, module: Module) -> Result<Lowered, TransformError> {
        for item in module.body {
            match item {
                ModuleItem::Stmt(stmt) => self.body.push(stmt),
                ModuleItem::ModuleDecl(decl) => self.lower_decl(decl)?,
            }
        }

        let mut body = self.imports;
        body.extend(self.body);
        Ok(Lowered {
            body,
            exports: self.exports,
            re_exports: self.re_exports,
            import_default: self.import_default,
        })
    }

    fn lower_decl(&mut self, decl: ModuleDecl) -> Result<(), TransformError> {
        match decl {
            ModuleDecl::Import(import) => self.lower_import(&import),
            ModuleDecl::ExportDecl(export) => self.lower_export_decl(export.decl),
            ModuleDecl::ExportNamed(named) => self.lower_named_export(&named),
            ModuleDecl::ExportDefaultDecl(export) => self.lower_default_decl(export.decl),
            ModuleDecl::ExportDefaultExpr(export) => self.lower_default_expr(export.expr),
            ModuleDecl::ExportAll(all) => {
                self.re_exports = true;
                let text = format!(
                    "__reExport({}, require({}));",
                    NAMESPACE,
                    js_string(&all.src.value)
                );
                self.hoist(&text)
            }
            _ => Err(TransformError::Unsupported(
                "TypeScript module syntax".to_string(),
            )),
        }
    }

    fn lower_import(&mut self, import: &ImportDecl) -> Result<(), TransformError> {
        let source = js_string(&import.src.value);
        if import.specifiers.is_empty() {
            return self.hoist(&format!("require({});", source));
        }

        let module = self.import_binding();
        let mut text = format!("const {} = require({});\n", module, source);
        let mut named = Vec::new();
        for specifier in &import.specifiers {
            match specifier {
                ImportSpecifier::Namespace(ns) => {
                    text.push_str(&format!("const {} = {};\n", &*ns.local.sym, module));
                }
                ImportSpecifier::Default(default) => {
                    text.push_str(&self.default_import(&default.local.sym, &module));
                }
                ImportSpecifier::Named(spec) => match &spec.imported {
                    Some(imported) if export_name(imported) == "default" => {
                        text.push_str(&self.default_import(&spec.local.sym, &module));
                    }
                    Some(imported) => {
                        named.push(format!("{}: {}", property_key(imported), &*spec.local.sym));
                    }
                    None => named.push(spec.local.sym.to_string()),
                },
            }
        }
        if !named.is_empty() {
            text.push_str(&format!("const {{ {} }} = {};\n", named.join(", "), module));
        }

        self.hoist(&text)
    }

    fn default_import(&mut self, local: &str, module: &str) -> String {
        self.import_default = true;
        format!("const {} = __importDefault({});\n", local, module)
    }

    fn lower_export_decl(&mut self, decl: Decl) -> Result<(), TransformError> {
        let names = match &decl {
            Decl::Class(class) => vec![class.ident.sym.to_string()],
            Decl::Fn(function) => vec![function.ident.sym.to_string()],
            Decl::Var(var) => bound_names(&var.decls),
            _ => {
                return Err(TransformError::Unsupported(
                    "exported TypeScript declaration".to_string(),
                ))
            }
        };
        for name in names {
            self.export(name.clone(), name);
        }
        self.body.push(Stmt::Decl(decl));
        Ok(())
    }

    fn lower_named_export(&mut self, named: &NamedExport) -> Result<(), TransformError> {
        let Some(src) = &named.src else {
            for specifier in &named.specifiers {
                let ExportSpecifier::Named(spec) = specifier else {
                    return Err(TransformError::Unsupported(
                        "namespace export without a source module".to_string(),
                    ));
                };
                let ModuleExportName::Ident(local) = &spec.orig else {
                    return Err(TransformError::Unsupported(
                        "string export name without a source module".to_string(),
                    ));
                };
                let exported = spec.exported.as_ref().unwrap_or(&spec.orig);
                self.export(export_name(exported), local.sym.to_string());
            }
            return Ok(());
        };

        let module = self.import_binding();
        self.hoist(&format!("var {} = require({});", module, js_string(&src.value)))?;
        for specifier in &named.specifiers {
            match specifier {
                ExportSpecifier::Namespace(ns) => {
                    self.export(export_name(&ns.name), module.clone());
                }
                ExportSpecifier::Default(default) => {
                    self.import_default = true;
                    self.export(
                        default.exported.sym.to_string(),
                        format!("__importDefault({})", module),
                    );
                }
                ExportSpecifier::Named(spec) => {
                    let orig = export_name(&spec.orig);
                    let getter = if orig == "default" {
                        self.import_default = true;
                        format!("__importDefault({})", module)
                    } else {
                        member_access(&module, &orig)
                    };
                    let exported = spec.exported.as_ref().unwrap_or(&spec.orig);
                    self.export(export_name(exported), getter);
                }
            }
        }
        Ok(())
    }

    fn lower_default_decl(&mut self, decl: DefaultDecl) -> Result<(), TransformError> {
        let decl = match decl {
            DefaultDecl::Fn(FnExpr { ident, function, .. }) => {
                let template = format!("function {}() {{}}", DEFAULT_BINDING);
                let Some(Stmt::Decl(Decl::Fn(mut fn_decl))) = self.snippet(&template)?.pop() else {
                    return Err(template_error("default function"));
                };
                fn_decl.function = function;
                if let Some(ident) = ident {
                    fn_decl.ident = ident;
                }
                Decl::Fn(fn_decl)
            }
            DefaultDecl::Class(ClassExpr { ident, class, .. }) => {
                let template = format!("class {} {{}}", DEFAULT_BINDING);
                let Some(Stmt::Decl(Decl::Class(mut class_decl))) = self.snippet(&template)?.pop() else {
                    return Err(template_error("default class"));
                };
                class_decl.class = class;
                if let Some(ident) = ident {
                    class_decl.ident = ident;
                }
                Decl::Class(class_decl)
            }
            DefaultDecl::TsInterfaceDecl(_) => {
                return Err(TransformError::Unsupported(
                    "exported TypeScript declaration".to_string(),
                ))
            }
        };

        let local = match &decl {
            Decl::Fn(fn_decl) => fn_decl.ident.sym.to_string(),
            Decl::Class(class_decl) => class_decl.ident.sym.to_string(),
            _ => DEFAULT_BINDING.to_string(),
        };
        self.export("default".to_string(), local);
        self.body.push(Stmt::Decl(decl));
        Ok(())
    }

    fn lower_default_expr(&mut self, expr: Box<Expr>) -> Result<(), TransformError> {
        let template = format!("var {} = 0;", DEFAULT_BINDING);
        let Some(Stmt::Decl(Decl::Var(mut var))) = self.snippet(&template)?.pop() else {
            return Err(template_error("default expression"));
        };
        let declarator = var
            .decls
            .first_mut()
            .ok_or_else(|| template_error("default expression"))?;
        declarator.init = Some(expr);

        self.export("default".to_string(), DEFAULT_BINDING.to_string());
        self.body.push(Stmt::Decl(Decl::Var(var)));
        Ok(())
    }

    fn export(&mut self, name: String, getter: String) {
        self.exports.push((name, getter));
    }

    fn import_binding(&mut self) -> String {
        let name = format!("__import_{}", self.next_import);
        self.next_import += 1;
        name
    }

    fn hoist(&mut self, text: &str) -> Result<(), TransformError> {
        let stmts = self.snippet(text)?;
        self.imports.extend(stmts);
        Ok(())
    }

    fn snippet(&self, text: &str) -> Result<Vec<Stmt>, TransformError> {
        let module = parse_snippet(self.cm, text)?;
        module
            .body
            .into_iter()
            .map(|item| match item {
                ModuleItem::Stmt(stmt) => Ok(stmt),
                ModuleItem::ModuleDecl(_) => Err(template_error("snippet")),
            })
            .collect()
    }
}

impl Lowered {
    /// A script has no module syntax to rewrite; its statements are wrapped as is.
    pub fn script(body: Vec<Stmt>) -> Self {
        Self {
            body,
            exports: Vec::new(),
            re_exports: false,
            import_default: false,
        }
    }

    /// True when the module exports anything and needs a namespace object.
    pub fn has_namespace(&self) -> bool {
        !self.exports.is_empty() || self.re_exports
    }

    /// Build the final module for `format`.
    pub fn into_module(
        self,
        cm: &Lrc<SourceMap>,
        format: Format,
        global_name: &str,
    ) -> Result<Module, TransformError> {
        let prologue = self.prologue(format);
        match format {
            Format::Iife => {
                let epilogue = if self.has_namespace() {
                    format!("return {};\n", NAMESPACE)
                } else {
                    String::new()
                };
                let text = format!(
                    "{}(() => {{\n{}{};\n{}}})();\n",
                    assignment_head(global_name),
                    prologue,
                    BODY_MARKER,
                    epilogue
                );
                let mut module = parse_snippet(cm, &text)?;
                let stmts = module
                    .body
                    .last_mut()
                    .and_then(iife_body)
                    .ok_or_else(|| template_error("iife wrapper"))?;
                splice_at_marker(stmts, self.body)?;
                Ok(module)
            }
            Format::Cjs => statements_after(cm, &prologue, self.body),
            Format::Esm => Err(TransformError::Internal(
                "esm output does not go through lowering".to_string(),
            )),
        }
    }

    fn prologue(&self, format: Format) -> String {
        let mut out = String::new();
        if self.has_namespace() {
            out.push_str(HELPER_DEF_PROP);
        }
        if !self.exports.is_empty() {
            out.push_str(HELPER_EXPORT);
        }
        if self.re_exports {
            out.push_str(HELPER_RE_EXPORT);
        }
        if self.import_default {
            out.push_str(HELPER_IMPORT_DEFAULT);
        }
        if !self.has_namespace() {
            return out;
        }

        out.push_str(&format!("var {} = {{}};\n", NAMESPACE));
        out.push_str(&format!(
            "__defProp({}, \"__esModule\", {{ value: true }});\n",
            NAMESPACE
        ));
        if !self.exports.is_empty() {
            let getters: Vec<String> = self
                .exports
                .iter()
                .map(|(name, getter)| format!("  {}: () => {}", js_string(name), getter))
                .collect();
            out.push_str(&format!(
                "__export({}, {{\n{}\n}});\n",
                NAMESPACE,
                getters.join(",\n")
            ));
        }
        if format == Format::Cjs {
            out.push_str(&format!("module.exports = {};\n", NAMESPACE));
        }
        out
    }
}

/// A module made of `stmts` alone.
pub fn plain_module(cm: &Lrc<SourceMap>, stmts: Vec<Stmt>) -> Result<Module, TransformError> {
    statements_after(cm, "", stmts)
}

fn statements_after(
    cm: &Lrc<SourceMap>,
    prologue: &str,
    stmts: Vec<Stmt>,
) -> Result<Module, TransformError> {
    let text = format!("{}{};\n", prologue, BODY_MARKER);
    let mut module = parse_snippet(cm, &text)?;
    let body = stmts.into_iter().map(ModuleItem::Stmt).collect();
    splice_at_marker(&mut module.body, body)?;
    Ok(module)
}

/// `var a = ` for a plain name; parent objects are created for dotted paths.
fn assignment_head(global_name: &str) -> String {
    if global_name.is_empty() {
        return String::new();
    }

    let parts: Vec<&str> = global_name.split('.').collect();
    let Some((last, parents)) = parts.split_last() else {
        return String::new();
    };
    if parents.is_empty() {
        return format!("var {} = ", last);
    }

    let mut head = String::new();
    let mut path = String::new();
    for (i, part) in parents.iter().enumerate() {
        if i == 0 {
            path.push_str(part);
            head.push_str(&format!("var {0} = {0} || {{}};\n", path));
        } else {
            path.push('.');
            path.push_str(part);
            head.push_str(&format!("{0} = {0} || {{}};\n", path));
        }
    }
    head.push_str(&format!("{}.{} = ", path, last));
    head
}

/// Locate the arrow body inside `var g = (() => {...})();`, `g.h = (...)();`
/// or a bare `(() => {...})();`.
fn iife_body(item: &mut ModuleItem) -> Option<&mut Vec<Stmt>> {
    let call = match item {
        ModuleItem::Stmt(Stmt::Decl(Decl::Var(var))) => var.decls.first_mut()?.init.as_deref_mut()?,
        ModuleItem::Stmt(Stmt::Expr(ExprStmt { expr, .. })) => match &mut **expr {
            Expr::Assign(AssignExpr { right, .. }) => &mut **right,
            other => other,
        },
        _ => return None,
    };
    let Expr::Call(CallExpr { callee: Callee::Expr(callee), .. }) = call else {
        return None;
    };
    let Expr::Paren(ParenExpr { expr, .. }) = &mut **callee else {
        return None;
    };
    let Expr::Arrow(ArrowExpr { body, .. }) = &mut **expr else {
        return None;
    };
    match &mut **body {
        BlockStmtOrExpr::BlockStmt(block) => Some(&mut block.stmts),
        _ => None,
    }
}

trait AsStmt {
    fn as_stmt(&self) -> Option<&Stmt>;
}

impl AsStmt for Stmt {
    fn as_stmt(&self) -> Option<&Stmt> {
        Some(self)
    }
}

impl AsStmt for ModuleItem {
    fn as_stmt(&self) -> Option<&Stmt> {
        match self {
            ModuleItem::Stmt(stmt) => Some(stmt),
            ModuleItem::ModuleDecl(_) => None,
        }
    }
}

fn is_body_marker<T: AsStmt>(item: &T) -> bool {
    let Some(Stmt::Expr(ExprStmt { expr, .. })) = item.as_stmt() else {
        return false;
    };
    matches!(&**expr, Expr::Ident(ident) if &*ident.sym == BODY_MARKER)
}

/// Replace the marker statement with `body`.
fn splice_at_marker<T: AsStmt>(items: &mut Vec<T>, body: Vec<T>) -> Result<(), TransformError> {
    let index = items
        .iter()
        .position(is_body_marker)
        .ok_or_else(|| template_error("body marker"))?;
    let tail = items.split_off(index + 1);
    items.pop();
    items.extend(body);
    items.extend(tail);
    Ok(())
}

fn parse_snippet(cm: &Lrc<SourceMap>, text: &str) -> Result<Module, TransformError> {
    parse_module(cm, "<runtime>", text.to_string()).map_err(|diagnostics| {
        let first = diagnostics
            .first()
            .map(|d| d.message.clone())
            .unwrap_or_default();
        TransformError::Internal(format!("generated code failed to parse: {}", first))
    })
}

fn template_error(what: &str) -> TransformError {
    TransformError::Internal(format!("unexpected {} template shape", what))
}

/// Collects the names bound by declarator patterns, skipping default values
/// and computed keys.
#[derive(Default)]
struct BindingNames {
    names: Vec<String>,
}

impl Visit for BindingNames {
    fn visit_binding_ident(&mut self, n: &BindingIdent) {
        self.names.push(n.id.sym.to_string());
    }

    fn visit_assign_pat_prop(&mut self, n: &AssignPatProp) {
        self.names.push(n.key.sym.to_string());
    }

    fn visit_expr(&mut self, _: &Expr) {}
}

fn bound_names(decls: &[VarDeclarator]) -> Vec<String> {
    let mut collector = BindingNames::default();
    for decl in decls {
        let name: &Pat = &decl.name;
        name.visit_with(&mut collector);
    }
    collector.names
}

fn export_name(name: &ModuleExportName) -> String {
    match name {
        ModuleExportName::Ident(ident) => ident.sym.to_string(),
        ModuleExportName::Str(s) => s.value.to_string(),
    }
}

/// Key usable in an object literal or destructuring pattern.
fn property_key(name: &ModuleExportName) -> String {
    match name {
        ModuleExportName::Ident(ident) => ident.sym.to_string(),
        ModuleExportName::Str(s) => js_string(&s.value),
    }
}

fn member_access(object: &str, property: &str) -> String {
    if is_identifier(property) {
        format!("{}.{}", object, property)
    } else {
        format!("{}[{}]", object, js_string(property))
    }
}

/// Quote `value` as a JavaScript string literal. JSON strings are valid
/// ECMAScript string literals.
fn js_string(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}
