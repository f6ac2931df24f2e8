use crate::language::{parser::parse_type, types::TypeNode};
use std::collections::HashMap;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BuiltinKind {
    Function,
    Variable,
    Type,
}

#[derive(Clone, Copy, Debug)]
pub struct BuiltinSymbol {
    pub name: &'static str,
    pub canonical: &'static str,
    pub header: Option<&'static str>,
    pub signature: &'static str,
    pub kind: BuiltinKind,
}

const fn function(
    name: &'static str,
    header: &'static str,
    signature: &'static str,
) -> BuiltinSymbol {
    BuiltinSymbol {
        name,
        canonical: name,
        header: Some(header),
        signature,
        kind: BuiltinKind::Function,
    }
}

const fn variable(
    name: &'static str,
    canonical: &'static str,
    header: &'static str,
    signature: &'static str,
) -> BuiltinSymbol {
    BuiltinSymbol {
        name,
        canonical,
        header: Some(header),
        signature,
        kind: BuiltinKind::Variable,
    }
}

const fn type_name(
    name: &'static str,
    canonical: &'static str,
    header: Option<&'static str>,
) -> BuiltinSymbol {
    BuiltinSymbol {
        name,
        canonical,
        header,
        signature: "",
        kind: BuiltinKind::Type,
    }
}

static SYMBOLS: &[BuiltinSymbol] = &[
    // types
    type_name("size_t", "size_t", Some("stddef.h")),
    type_name("ssize_t", "ssize_t", Some("sys/types.h")),
    type_name("pid_t", "pid_t", Some("sys/types.h")),
    type_name("bool", "bool", Some("stdbool.h")),
    type_name("int8_t", "int8_t", Some("stdint.h")),
    type_name("int16_t", "int16_t", Some("stdint.h")),
    type_name("int32_t", "int32_t", Some("stdint.h")),
    type_name("int64_t", "int64_t", Some("stdint.h")),
    type_name("uint8_t", "uint8_t", Some("stdint.h")),
    type_name("uint16_t", "uint16_t", Some("stdint.h")),
    type_name("uint32_t", "uint32_t", Some("stdint.h")),
    type_name("uint64_t", "uint64_t", Some("stdint.h")),
    type_name("uintptr_t", "uintptr_t", Some("stdint.h")),
    type_name("FILE", "FILE", Some("stdio.h")),
    // variables
    variable("NULL", "NULL", "stddef.h", "*void"),
    variable("null", "NULL", "stddef.h", "*void"),
    variable("true", "true", "stdbool.h", "bool"),
    variable("false", "false", "stdbool.h", "bool"),
    variable("stdin", "stdin", "stdio.h", "*FILE"),
    variable("stdout", "stdout", "stdio.h", "*FILE"),
    variable("stderr", "stderr", "stdio.h", "*FILE"),
    variable("errno", "errno", "errno.h", "int"),
    variable("_IONBF", "_IONBF", "stdio.h", "int"),
    variable("EOF", "EOF", "stdio.h", "int"),
    // stdio
    function("printf", "stdio.h", "fn (*char, ...) int"),
    function("sprintf", "stdio.h", "fn (*char, *char, ...) int"),
    function("snprintf", "stdio.h", "fn (*char, size_t, *char, ...) int"),
    function("scanf", "stdio.h", "fn (*char, ...) int"),
    function("puts", "stdio.h", "fn (*char) int"),
    function("putchar", "stdio.h", "fn (int) int"),
    function("getchar", "stdio.h", "fn () int"),
    function("gets", "stdio.h", "fn (*char) *char"),
    function("fgets", "stdio.h", "fn (*char, int, *FILE) *char"),
    function("fflush", "stdio.h", "fn (*FILE) int"),
    function("setvbuf", "stdio.h", "fn (*FILE, *char, int, size_t) int"),
    // string
    function("strcpy", "string.h", "fn (*char, *char) *char"),
    function("strncpy", "string.h", "fn (*char, *char, size_t) *char"),
    function("strcat", "string.h", "fn (*char, *char) *char"),
    function("strcmp", "string.h", "fn (*char, *char) int"),
    function("strncmp", "string.h", "fn (*char, *char, size_t) int"),
    function("strlen", "string.h", "fn (*char) size_t"),
    function("strchr", "string.h", "fn (*char, int) *char"),
    function("memset", "string.h", "fn (*void, int, size_t) *void"),
    function("memcpy", "string.h", "fn (*void, *void, size_t) *void"),
    function("memcmp", "string.h", "fn (*void, *void, size_t) int"),
    // stdlib
    function("malloc", "stdlib.h", "fn (size_t) *void"),
    function("calloc", "stdlib.h", "fn (size_t, size_t) *void"),
    function("free", "stdlib.h", "fn (*void) void"),
    function("exit", "stdlib.h", "fn (int) void"),
    function("abort", "stdlib.h", "fn () void"),
    function("atoi", "stdlib.h", "fn (*char) int"),
    function("system", "stdlib.h", "fn (*char) int"),
    function("rand", "stdlib.h", "fn () int"),
    function("srand", "stdlib.h", "fn (unsigned int) void"),
    // unistd
    function("read", "unistd.h", "fn (int, *void, size_t) ssize_t"),
    function("write", "unistd.h", "fn (int, *void, size_t) ssize_t"),
    function("sleep", "unistd.h", "fn (unsigned int) unsigned int"),
    function("alarm", "unistd.h", "fn (unsigned int) unsigned int"),
    function("getpid", "unistd.h", "fn () pid_t"),
];

/// Read-only view over the builtin C symbol table.
#[derive(Clone, Debug)]
pub struct Builtins {
    symbols: HashMap<&'static str, &'static BuiltinSymbol>,
}

impl Builtins {
    pub fn new() -> Self {
        Self {
            symbols: SYMBOLS.iter().map(|symbol| (symbol.name, symbol)).collect(),
        }
    }

    pub fn lookup(&self, name: &str) -> Option<&'static BuiltinSymbol> {
        self.symbols.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.symbols.contains_key(name)
    }

    pub fn translate<'a>(&self, name: &'a str) -> &'a str {
        match self.lookup(name) {
            Some(symbol) => symbol.canonical,
            None => name,
        }
    }

    pub fn header(&self, name: &str) -> Option<&'static str> {
        self.lookup(name).and_then(|symbol| symbol.header)
    }

    /// Parsed type of a builtin function or variable; `None` for types and
    /// unknown names.
    pub fn signature(&self, name: &str) -> Option<Result<TypeNode, String>> {
        let symbol = self.lookup(name)?;
        if symbol.kind == BuiltinKind::Type {
            return None;
        }
        Some(parse_type(symbol.signature))
    }
}

impl Default for Builtins {
    fn default() -> Self {
        Self::new()
    }
}
