use crate::{
    graph::{chunk::VarHandle, expr::Stmt},
    language::types::TypeNode,
};

#[derive(Clone, Debug)]
pub struct Declaration {
    pub variable: VarHandle,
    pub is_static: bool,
}

#[derive(Clone, Debug)]
pub struct FunctionDefinition {
    pub name: String,
    pub ret: TypeNode,
    pub params: Vec<VarHandle>,
    pub statics: Vec<VarHandle>,
    pub locals: Vec<VarHandle>,
    pub body: Vec<Stmt>,
}

impl FunctionDefinition {
    pub fn is_main(&self) -> bool {
        self.name == "main"
    }

    pub fn signature(&self) -> TypeNode {
        TypeNode::func(
            self.ret.clone(),
            self.params
                .iter()
                .map(|param| param.vtype.clone().unwrap_or_else(TypeNode::void))
                .collect(),
            false,
        )
    }
}

/// Output of one interpreter run, consumed once by codegen.
#[derive(Clone, Debug, Default)]
pub struct Program {
    pub externs: Vec<VarHandle>,
    pub globals: Vec<Declaration>,
    pub functions: Vec<FunctionDefinition>,
}

impl Program {
    pub fn function(&self, name: &str) -> Option<&FunctionDefinition> {
        self.functions.iter().find(|function| function.name == name)
    }
}
