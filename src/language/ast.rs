use serde::Deserialize;

fn default_entry() -> String {
    "main".to_string()
}

/// Input document: the already validated program description.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Document {
    #[serde(default = "default_entry")]
    pub entry: String,
    #[serde(default)]
    pub externs: Vec<ExternDecl>,
    #[serde(default)]
    pub chunks: Vec<ChunkDecl>,
    #[serde(default)]
    pub blocks: Vec<BlockDecl>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExternDecl {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChunkDecl {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub local: bool,
    #[serde(default)]
    pub global: bool,
    #[serde(default, rename = "static")]
    pub is_static: bool,
    #[serde(default)]
    pub variables: Vec<VariableDecl>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VariableDecl {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
    #[serde(default)]
    pub initial: Option<ExprNode>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BlockDecl {
    pub name: String,
    #[serde(default)]
    pub func: bool,
    #[serde(default)]
    pub inline: bool,
    #[serde(default)]
    pub nop: bool,
    #[serde(default)]
    pub statements: Vec<StmtNode>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StmtNode {
    Assign {
        target: ExprNode,
        value: ExprNode,
    },
    Call(String),
    If {
        branches: Vec<BranchNode>,
        #[serde(default, rename = "else")]
        otherwise: Option<Vec<StmtNode>>,
    },
    While {
        condition: ExprNode,
        #[serde(default)]
        body: Vec<StmtNode>,
    },
    Expr(ExprNode),
    Group(Vec<StmtNode>),
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BranchNode {
    pub condition: ExprNode,
    #[serde(default)]
    pub body: Vec<StmtNode>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExprNode {
    Var(String),
    Ref(Box<ExprNode>),
    Deref(Box<ExprNode>),
    Index {
        target: Box<ExprNode>,
        index: Box<ExprNode>,
    },
    Call {
        target: Box<ExprNode>,
        #[serde(default)]
        args: Vec<ExprNode>,
    },
    Op {
        op: String,
        operands: Vec<ExprNode>,
    },
    Value(String),
    Cast {
        expr: Box<ExprNode>,
        #[serde(rename = "type")]
        ty: String,
    },
    SizeofExpr(Box<ExprNode>),
    SizeofType(String),
}
