use std::{collections::VecDeque, fmt};

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TypeNode {
    Simple(String),
    Pointer(Box<TypeNode>),
    Array(Box<TypeNode>, Option<u64>),
    Func {
        ret: Box<TypeNode>,
        args: Vec<TypeNode>,
        variadic: bool,
    },
}

impl TypeNode {
    pub fn simple(name: impl Into<String>) -> Self {
        TypeNode::Simple(name.into())
    }

    pub fn void() -> Self {
        TypeNode::simple("void")
    }

    pub fn pointer(base: TypeNode) -> Self {
        TypeNode::Pointer(Box::new(base))
    }

    pub fn array(base: TypeNode, size: Option<u64>) -> Self {
        TypeNode::Array(Box::new(base), size)
    }

    pub fn func(ret: TypeNode, args: Vec<TypeNode>, variadic: bool) -> Self {
        TypeNode::Func {
            ret: Box::new(ret),
            args,
            variadic,
        }
    }

    pub fn is_void(&self) -> bool {
        matches!(self, TypeNode::Simple(name) if name == "void")
    }

    pub fn meta(&self) -> MetaType {
        match self {
            TypeNode::Simple(name) => meta_type(name),
            TypeNode::Pointer(_) | TypeNode::Array(..) | TypeNode::Func { .. } => {
                MetaType::Pointer
            }
        }
    }

    /// Strips one pointer or array level.
    pub fn pointee(&self) -> Option<&TypeNode> {
        match self {
            TypeNode::Pointer(base) | TypeNode::Array(base, _) => Some(base),
            _ => None,
        }
    }

    pub fn canonical_name(&self) -> String {
        match self {
            TypeNode::Simple(name) => name.clone(),
            TypeNode::Pointer(base) => format!("*{}", base.canonical_name()),
            TypeNode::Array(base, Some(size)) => format!("[{}]{}", size, base.canonical_name()),
            TypeNode::Array(base, None) => format!("[]{}", base.canonical_name()),
            TypeNode::Func {
                ret,
                args,
                variadic,
            } => {
                let mut rendered: Vec<String> = args.iter().map(|ty| ty.canonical_name()).collect();
                if *variadic {
                    rendered.push("...".into());
                }
                format!("fn ({}) {}", rendered.join(", "), ret.canonical_name())
            }
        }
    }
}

impl fmt::Display for TypeNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical_name())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MetaType {
    Integral,
    Floating,
    Boolean,
    Pointer,
    Any,
    Void,
    Complex,
}

const INTEGRAL_WORDS: &[&str] = &["char", "short", "int", "long", "signed", "unsigned"];

pub fn meta_type(name: &str) -> MetaType {
    match name {
        "void" => MetaType::Void,
        "bool" | "_Bool" => MetaType::Boolean,
        "float" | "double" | "long double" => MetaType::Floating,
        "any" => MetaType::Any,
        "size_t" | "ssize_t" | "off_t" | "pid_t" | "time_t" | "intptr_t" | "uintptr_t"
        | "int8_t" | "int16_t" | "int32_t" | "int64_t" | "uint8_t" | "uint16_t"
        | "uint32_t" | "uint64_t" => MetaType::Integral,
        other if other.split_whitespace().all(|word| INTEGRAL_WORDS.contains(&word)) => {
            MetaType::Integral
        }
        _ => MetaType::Complex,
    }
}

fn meta_edges(meta: MetaType) -> &'static [MetaType] {
    match meta {
        MetaType::Boolean => &[MetaType::Integral],
        MetaType::Integral => &[MetaType::Boolean, MetaType::Floating],
        MetaType::Floating => &[MetaType::Integral],
        MetaType::Pointer => &[MetaType::Boolean],
        MetaType::Any | MetaType::Void | MetaType::Complex => &[],
    }
}

/// Whether a value of meta-type `actual` may flow where `expected` is wanted.
pub fn meta_reachable(expected: MetaType, actual: MetaType) -> bool {
    if expected == actual {
        return true;
    }
    let mut seen = vec![actual];
    let mut queue = VecDeque::from([actual]);
    while let Some(current) = queue.pop_front() {
        for next in meta_edges(current) {
            if *next == expected {
                return true;
            }
            if !seen.contains(next) {
                seen.push(*next);
                queue.push_back(*next);
            }
        }
    }
    false
}

pub fn type_check(expected: &TypeNode, actual: &TypeNode) -> bool {
    if expected.meta() == MetaType::Any || actual.meta() == MetaType::Any {
        return true;
    }
    match (expected, actual) {
        (TypeNode::Simple(left), TypeNode::Simple(right)) => {
            let (left_meta, right_meta) = (meta_type(left), meta_type(right));
            if left_meta == MetaType::Complex || right_meta == MetaType::Complex {
                left == right
            } else {
                meta_reachable(left_meta, right_meta)
            }
        }
        (TypeNode::Simple(name), _) => meta_type(name) == MetaType::Boolean,
        (TypeNode::Pointer(left), TypeNode::Pointer(right))
        | (TypeNode::Pointer(left), TypeNode::Array(right, _))
        | (TypeNode::Array(left, _), TypeNode::Array(right, _))
        | (TypeNode::Array(left, _), TypeNode::Pointer(right)) => {
            left.is_void() || right.is_void() || type_check(left, right)
        }
        (TypeNode::Pointer(left), TypeNode::Func { .. }) => type_check(left, actual),
        (
            TypeNode::Func {
                ret: left_ret,
                args: left_args,
                variadic: left_variadic,
            },
            TypeNode::Func {
                ret: right_ret,
                args: right_args,
                variadic: right_variadic,
            },
        ) => {
            left_variadic == right_variadic
                && left_args.len() == right_args.len()
                && type_check(left_ret, right_ret)
                && left_args
                    .iter()
                    .zip(right_args)
                    .all(|(left, right)| type_check(left, right))
        }
        _ => false,
    }
}
