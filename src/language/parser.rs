use crate::language::types::TypeNode;
use nom::{
    branch::alt,
    bytes::complete::tag,
    character::complete::{alpha1, alphanumeric1, char, digit1, multispace0, multispace1},
    combinator::{all_consuming, map, map_res, opt, recognize},
    multi::{many0, separated_list0, separated_list1},
    sequence::{delimited, pair, preceded, terminated, tuple},
    IResult,
};

enum FuncArg {
    Type(TypeNode),
    Variadic,
}

fn identifier(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        alt((alpha1, tag("_"))),
        many0(alt((alphanumeric1, tag("_")))),
    ))(input)
}

fn simple_type(input: &str) -> IResult<&str, TypeNode> {
    map(separated_list1(multispace1, identifier), |words: Vec<&str>| {
        TypeNode::Simple(words.join(" "))
    })(input)
}

fn pointer_type(input: &str) -> IResult<&str, TypeNode> {
    map(preceded(char('*'), type_node), TypeNode::pointer)(input)
}

fn array_size(input: &str) -> IResult<&str, Option<u64>> {
    delimited(
        char('['),
        delimited(
            multispace0,
            opt(map_res(digit1, |digits: &str| digits.parse::<u64>())),
            multispace0,
        ),
        char(']'),
    )(input)
}

fn array_type(input: &str) -> IResult<&str, TypeNode> {
    map(pair(array_size, type_node), |(size, base)| {
        TypeNode::array(base, size)
    })(input)
}

fn func_arg(input: &str) -> IResult<&str, FuncArg> {
    preceded(
        multispace0,
        alt((
            map(tag("..."), |_| FuncArg::Variadic),
            map(type_node, FuncArg::Type),
        )),
    )(input)
}

fn func_type(input: &str) -> IResult<&str, TypeNode> {
    let (input, _) = tuple((tag("fn"), multispace0))(input)?;
    let (input, args) = delimited(
        char('('),
        separated_list0(preceded(multispace0, char(',')), func_arg),
        preceded(multispace0, char(')')),
    )(input)?;
    let (input, ret) = opt(type_node)(input)?;

    let mut types = Vec::new();
    let mut variadic = false;
    for (idx, arg) in args.iter().enumerate() {
        match arg {
            FuncArg::Type(ty) => types.push(ty.clone()),
            FuncArg::Variadic if idx + 1 == args.len() => variadic = true,
            FuncArg::Variadic => {
                return Err(nom::Err::Failure(nom::error::Error::new(
                    input,
                    nom::error::ErrorKind::Verify,
                )))
            }
        }
    }
    Ok((
        input,
        TypeNode::func(ret.unwrap_or_else(TypeNode::void), types, variadic),
    ))
}

fn type_node(input: &str) -> IResult<&str, TypeNode> {
    preceded(
        multispace0,
        alt((pointer_type, array_type, func_type, simple_type)),
    )(input)
}

/// Parses type text such as `[64]char`, `*FILE` or `fn (*char, ...) int`.
pub fn parse_type(text: &str) -> Result<TypeNode, String> {
    match all_consuming(terminated(type_node, multispace0))(text) {
        Ok((_, ty)) => Ok(ty),
        Err(nom::Err::Error(err)) | Err(nom::Err::Failure(err)) => {
            if err.input.is_empty() {
                Err("unexpected end of type".to_string())
            } else {
                Err(format!("unexpected input `{}`", err.input))
            }
        }
        Err(nom::Err::Incomplete(_)) => Err("incomplete type".to_string()),
    }
}
