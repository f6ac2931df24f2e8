use crate::{
    graph::{
        Declaration, Expr, ExprKind, FunctionDefinition, IfBranch, Program, Stmt, StmtKind,
        VarHandle,
    },
    language::{types::TypeNode, Builtins},
};
use std::collections::BTreeSet;

const INDENT: &str = "    ";

/// Renders a program as C source. Headers are collected while declarations
/// and expressions are translated and emitted first.
pub struct CodeGen<'b> {
    builtins: &'b Builtins,
    includes: BTreeSet<&'static str>,
}

impl<'b> CodeGen<'b> {
    pub fn new(builtins: &'b Builtins) -> Self {
        Self {
            builtins,
            includes: BTreeSet::new(),
        }
    }

    pub fn generate(mut self, program: &Program) -> String {
        let mut sections = Vec::new();

        let mut externs = String::new();
        for variable in &program.externs {
            if self.is_builtin(variable) {
                self.require(&variable.name);
                continue;
            }
            externs.push_str(&format!("extern {};\n", self.declare_var(variable)));
        }

        let mut globals = String::new();
        for decl in &program.globals {
            self.write_declaration(&mut globals, 0, decl);
        }

        let mut prototypes = String::new();
        for function in program.functions.iter().filter(|f| !f.is_main()) {
            prototypes.push_str(&format!("{};\n", self.signature(function)));
        }

        let mut bodies = Vec::with_capacity(program.functions.len());
        for function in &program.functions {
            let mut out = String::new();
            self.write_function(&mut out, function);
            bodies.push(out);
        }

        let includes: String = self
            .includes
            .iter()
            .map(|header| format!("#include <{header}>\n"))
            .collect();
        for section in [includes, externs, globals, prototypes] {
            if !section.is_empty() {
                sections.push(section);
            }
        }
        sections.extend(bodies);
        sections.join("\n")
    }

    fn is_builtin(&self, variable: &VarHandle) -> bool {
        variable.chunk.is_none() && self.builtins.contains(&variable.name)
    }

    fn require(&mut self, name: &str) {
        if let Some(header) = self.builtins.header(name) {
            self.includes.insert(header);
        }
    }

    fn write_declaration(&mut self, out: &mut String, depth: usize, decl: &Declaration) {
        write_indent(out, depth);
        if decl.is_static {
            out.push_str("static ");
        }
        out.push_str(&self.declare_var(&decl.variable));
        if let Some(initial) = &decl.variable.initial {
            out.push_str(" = ");
            out.push_str(&self.expr(initial));
        }
        out.push_str(";\n");
    }

    fn declare_var(&mut self, variable: &VarHandle) -> String {
        let ty = variable.vtype.clone().unwrap_or_else(TypeNode::void);
        self.declarator(&ty, &variable.name)
    }

    /// C declarator for `name` of type `ty`; an empty name gives the bare
    /// type as used in casts and prototypes.
    pub fn declarator(&mut self, ty: &TypeNode, name: &str) -> String {
        match ty {
            TypeNode::Simple(base) => {
                self.require(base);
                let base = self.builtins.translate(base);
                if name.is_empty() {
                    base.to_string()
                } else {
                    format!("{base} {name}")
                }
            }
            TypeNode::Pointer(base) => {
                let inner = format!("*{name}");
                match base.as_ref() {
                    TypeNode::Array(..) | TypeNode::Func { .. } => {
                        self.declarator(base, &format!("({inner})"))
                    }
                    _ => self.declarator(base, &inner),
                }
            }
            TypeNode::Array(base, size) => {
                let size = size.map(|size| size.to_string()).unwrap_or_default();
                self.declarator(base, &format!("{name}[{size}]"))
            }
            TypeNode::Func {
                ret,
                args,
                variadic,
            } => {
                let mut params: Vec<String> =
                    args.iter().map(|arg| self.declarator(arg, "")).collect();
                if *variadic {
                    params.push("...".into());
                }
                if params.is_empty() {
                    params.push("void".into());
                }
                self.declarator(ret, &format!("{name}({})", params.join(", ")))
            }
        }
    }

    fn signature(&mut self, function: &FunctionDefinition) -> String {
        let mut params: Vec<String> = function
            .params
            .iter()
            .map(|param| self.declare_var(param))
            .collect();
        if params.is_empty() {
            params.push("void".into());
        }
        let name = format!("{}({})", function.name, params.join(", "));
        self.declarator(&function.ret, &name)
    }

    fn write_function(&mut self, out: &mut String, function: &FunctionDefinition) {
        out.push_str(&self.signature(function));
        out.push_str(" {\n");
        for variable in &function.statics {
            let decl = Declaration {
                variable: variable.clone(),
                is_static: true,
            };
            self.write_declaration(out, 1, &decl);
        }
        for variable in &function.locals {
            let decl = Declaration {
                variable: variable.clone(),
                is_static: false,
            };
            self.write_declaration(out, 1, &decl);
        }
        self.write_body(out, 1, &function.body);
        if function.is_main() {
            write_indent(out, 1);
            out.push_str("return 0;\n");
        }
        out.push_str("}\n");
    }

    fn write_body(&mut self, out: &mut String, depth: usize, body: &[Stmt]) {
        for stmt in body {
            self.write_stmt(out, depth, stmt);
        }
    }

    fn write_stmt(&mut self, out: &mut String, depth: usize, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::Assignment { target, value } => {
                write_indent(out, depth);
                let target = self.expr(target);
                let value = self.expr(value);
                out.push_str(&format!("{target} = {value};\n"));
            }
            StmtKind::Call(target) => {
                write_indent(out, depth);
                out.push_str(&format!("{}();\n", target.name));
            }
            StmtKind::If(branches) => self.write_if(out, depth, branches),
            StmtKind::While { condition, body } => {
                write_indent(out, depth);
                let condition = self.condition(condition);
                out.push_str(&format!("while {condition} {{\n"));
                self.write_body(out, depth + 1, body);
                write_indent(out, depth);
                out.push_str("}\n");
            }
            StmtKind::Expression(expr) => {
                write_indent(out, depth);
                let expr = self.expr(expr);
                out.push_str(&format!("{expr};\n"));
            }
            StmtKind::Group(body) => self.write_body(out, depth, body),
        }
    }

    fn write_if(&mut self, out: &mut String, depth: usize, branches: &[IfBranch]) {
        write_indent(out, depth);
        for (idx, branch) in branches.iter().enumerate() {
            match (&branch.condition, idx) {
                (Some(condition), 0) => {
                    let condition = self.condition(condition);
                    out.push_str(&format!("if {condition} {{\n"));
                }
                (Some(condition), _) => {
                    let condition = self.condition(condition);
                    out.push_str(&format!(" else if {condition} {{\n"));
                }
                (None, _) => out.push_str(" else {\n"),
            }
            self.write_body(out, depth + 1, &branch.body);
            write_indent(out, depth);
            out.push('}');
        }
        out.push('\n');
    }

    /// Parenthesized exactly once.
    fn condition(&mut self, expr: &Expr) -> String {
        let rendered = self.expr(expr);
        match expr.kind {
            ExprKind::Operation { .. } => rendered,
            _ => format!("({rendered})"),
        }
    }

    pub fn expr(&mut self, expr: &Expr) -> String {
        match &expr.kind {
            ExprKind::Variable(variable) => {
                if self.is_builtin(variable) {
                    self.require(&variable.name);
                    self.builtins.translate(&variable.name).to_string()
                } else {
                    variable.name.clone()
                }
            }
            ExprKind::Ref(target) => format!("&{}", self.expr(target)),
            ExprKind::Deref(target) => format!("*{}", self.expr(target)),
            ExprKind::Array { target, index } => {
                let target = self.postfix_target(target);
                format!("{target}[{}]", self.expr(index))
            }
            ExprKind::Function { target, args } => {
                let target = self.postfix_target(target);
                let args: Vec<String> = args.iter().map(|arg| self.expr(arg)).collect();
                format!("{target}({})", args.join(", "))
            }
            ExprKind::Operation { op, operands } => {
                let rendered: Vec<String> =
                    operands.iter().map(|operand| self.expr(operand)).collect();
                match rendered.as_slice() {
                    [operand] => format!("({op}{operand})"),
                    _ => format!("({})", rendered.join(&format!(" {op} "))),
                }
            }
            ExprKind::Value(text) => text.clone(),
            ExprKind::Cast { target, ty } => {
                let ty = self.declarator(ty, "");
                format!("({ty}){}", self.expr(target))
            }
            ExprKind::SizeOfExpr(target) => format!("sizeof({})", self.expr(target)),
            ExprKind::SizeOfType(ty) => format!("sizeof({})", self.declarator(ty, "")),
        }
    }

    fn postfix_target(&mut self, target: &Expr) -> String {
        let rendered = self.expr(target);
        match target.kind {
            ExprKind::Ref(_) | ExprKind::Deref(_) | ExprKind::Cast { .. } => {
                format!("({rendered})")
            }
            _ => rendered,
        }
    }
}

fn write_indent(out: &mut String, depth: usize) {
    for _ in 0..depth {
        out.push_str(INDENT);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::ChunkVariable;

    fn var(name: &str, ty: TypeNode) -> VarHandle {
        ChunkVariable::detached(name, Some(ty))
    }

    fn int() -> TypeNode {
        TypeNode::simple("int")
    }

    #[test]
    fn declarators_nest_pointers_arrays_and_functions() {
        let builtins = Builtins::new();
        let mut gen = CodeGen::new(&builtins);
        let char_ty = TypeNode::simple("char");
        assert_eq!(
            gen.declarator(&TypeNode::array(char_ty.clone(), Some(64)), "buf"),
            "char buf[64]"
        );
        assert_eq!(
            gen.declarator(
                &TypeNode::pointer(TypeNode::array(char_ty.clone(), Some(8))),
                "rows"
            ),
            "char (*rows)[8]"
        );
        assert_eq!(
            gen.declarator(
                &TypeNode::pointer(TypeNode::func(int(), vec![char_ty.clone()], false)),
                "handler"
            ),
            "int (*handler)(char)"
        );
        assert_eq!(
            gen.declarator(&TypeNode::pointer(TypeNode::pointer(char_ty)), ""),
            "char **"
        );
    }

    #[test]
    fn operators_parenthesize_themselves_and_conditions_once() {
        let builtins = Builtins::new();
        let mut gen = CodeGen::new(&builtins);
        let x = Expr::variable(var("x", int()));
        let sum = Expr::operation("+", vec![x.clone(), Expr::value("1")]);
        let cmp = Expr::operation("<", vec![sum, Expr::value("10")]);
        assert_eq!(gen.condition(&cmp), "((x + 1) < 10)");
        assert_eq!(gen.condition(&x), "(x)");
        let neg = Expr::operation("!", vec![x]);
        assert_eq!(gen.expr(&neg), "(!x)");
    }

    #[test]
    fn postfix_targets_of_unary_expressions_are_wrapped() {
        let builtins = Builtins::new();
        let mut gen = CodeGen::new(&builtins);
        let p = Expr::variable(var("p", TypeNode::pointer(TypeNode::array(int(), Some(4)))));
        let element = Expr::array(Expr::deref(p), Expr::value("2"));
        assert_eq!(gen.expr(&element), "(*p)[2]");
        let address = Expr::reference(Expr::array(
            Expr::variable(var("a", TypeNode::array(int(), Some(4)))),
            Expr::value("1"),
        ));
        assert_eq!(gen.expr(&address), "&a[1]");
    }

    #[test]
    fn program_layout_and_includes() {
        let builtins = Builtins::new();
        let printf = ChunkVariable::detached(
            "printf",
            builtins.signature("printf").and_then(Result::ok),
        );
        let counter = var("counter", int());
        let param = var("counter", TypeNode::pointer(int()));
        let helper = FunctionDefinition {
            name: "bump".into(),
            ret: TypeNode::void(),
            params: vec![param.clone()],
            statics: Vec::new(),
            locals: Vec::new(),
            body: vec![Stmt::assignment(
                Expr::deref(Expr::variable(param.clone())),
                Expr::operation(
                    "+",
                    vec![Expr::deref(Expr::variable(param)), Expr::value("1")],
                ),
            )],
        };
        let bump = ChunkVariable::detached(
            "bump",
            Some(TypeNode::func(TypeNode::void(), vec![TypeNode::pointer(int())], false)),
        );
        let main = FunctionDefinition {
            name: "main".into(),
            ret: int(),
            params: Vec::new(),
            statics: Vec::new(),
            locals: vec![counter.clone()],
            body: vec![
                Stmt::expression(Expr::call(
                    Expr::variable(bump),
                    vec![Expr::reference(Expr::variable(counter.clone()))],
                )),
                Stmt::if_chain(vec![
                    IfBranch {
                        condition: Some(Expr::variable(counter.clone())),
                        body: vec![Stmt::expression(Expr::call(
                            Expr::variable(printf.clone()),
                            vec![Expr::value("\"yes\\n\"")],
                        ))],
                    },
                    IfBranch {
                        condition: None,
                        body: Vec::new(),
                    },
                ]),
            ],
        };
        let program = Program {
            externs: vec![printf],
            globals: vec![Declaration {
                variable: ChunkVariable::detached("limit", Some(int())),
                is_static: true,
            }],
            functions: vec![helper, main],
        };
        let source = CodeGen::new(&builtins).generate(&program);
        let expected = "\
#include <stdio.h>

static int limit;

void bump(int *counter);

void bump(int *counter) {
    *counter = (*counter + 1);
}

int main(void) {
    int counter;
    bump(&counter);
    if (counter) {
        printf(\"yes\\n\");
    } else {
    }
    return 0;
}
";
        assert_eq!(source, expected);
    }
}
