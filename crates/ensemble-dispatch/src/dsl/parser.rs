//! Recursive-descent parser for definition blocks.
//!
//! Parsing is pure: nothing is registered until the resulting
//! [`Definition`] is materialized.

use crate::script::{split_commands, Command, ParseError, Word};

use super::ast::{Definition, EnsembleNode, Item, PartKeyword, PartNode};

const ENSEMBLE_USAGE: &str = "wrong # args: should be \"ensemble name ?command arg arg...?\"";

/// Parses a definition source.
///
/// Only `ensemble` commands are allowed at the top level.
pub fn parse(source: &str) -> Result<Definition, ParseError> {
    let mut ensembles = Vec::new();
    for command in split_commands(source, 1)? {
        let (keyword, rest) = split_keyword(&command);
        if keyword != "ensemble" {
            return Err(ParseError {
                line: command.line,
                message: format!("invalid command name \"{}\"", keyword),
            });
        }
        ensembles.push(parse_ensemble(rest, command.line)?);
    }
    Ok(Definition { ensembles })
}

/// Parses the words following an `ensemble` keyword.
///
/// - `name` alone names (or creates) an empty ensemble
/// - `name {block}` parses the block as the ensemble body
/// - `name command args...` applies a single command
pub fn parse_ensemble(words: &[Word], line: usize) -> Result<EnsembleNode, ParseError> {
    let Some((name, rest)) = words.split_first() else {
        return Err(ParseError {
            line,
            message: ENSEMBLE_USAGE.to_string(),
        });
    };

    let items = match rest {
        [] => Vec::new(),
        [block] => parse_block(block)?,
        _ => vec![parse_item(rest, rest[0].line)?],
    };
    Ok(EnsembleNode {
        name: name.text.clone(),
        line,
        items,
    })
}

fn parse_block(block: &Word) -> Result<Vec<Item>, ParseError> {
    split_commands(&block.text, block.line)?
        .iter()
        .map(|command| parse_item(&command.words, command.line))
        .collect()
}

fn parse_item(words: &[Word], line: usize) -> Result<Item, ParseError> {
    let keyword = words.first().map(|w| w.text.as_str()).unwrap_or_default();
    let part_keyword = match keyword {
        "part" => PartKeyword::Part,
        "option" => PartKeyword::Option,
        "ensemble" => return parse_ensemble(&words[1..], line).map(Item::Ensemble),
        other => {
            return Err(ParseError {
                line,
                message: format!("invalid command name \"{}\"", other),
            })
        }
    };

    match words {
        [_, name, arg_spec, body] => Ok(Item::Part(PartNode {
            keyword: part_keyword,
            name: name.text.clone(),
            arg_spec: arg_spec.text.clone(),
            body: body.text.clone(),
            line,
        })),
        _ => Err(ParseError {
            line,
            message: format!(
                "wrong # args: should be \"{} name args body\"",
                part_keyword.as_str()
            ),
        }),
    }
}

fn split_keyword(command: &Command) -> (&str, &[Word]) {
    match command.words.split_first() {
        Some((first, rest)) => (first.text.as_str(), rest),
        None => ("", &[]),
    }
}
