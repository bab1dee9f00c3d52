//! Corefile parsing

use crate::plugin::{create_plugin, Plugin};
use anyhow::{bail, Context, Result};

#[derive(Clone, Debug, PartialEq)]
pub struct PluginConfig {
    pub name: String,
    pub args: Vec<String>,
    pub block: Vec<PluginConfig>,
}

pub struct Config {
    pub zones: Vec<ZoneConfig>,
}

pub struct ZoneConfig {
    pub name: String,
    pub plugins: Vec<Box<dyn Plugin>>,
}

impl ZoneConfig {
    /// Port from a zone key such as `.:1053`, 53 when none is given.
    pub fn port(&self) -> Result<u16> {
        port_of(&self.name)
    }
}

fn port_of(zone: &str) -> Result<u16> {
    match zone.rsplit_once(':') {
        Some((_, port)) => port.parse().with_context(|| format!("invalid port in zone '{}'", zone)),
        None => Ok(53),
    }
}

#[derive(Debug, PartialEq)]
enum Token { Text(String), OpenBrace, CloseBrace, Newline }

#[derive(Debug)]
struct RawZone { name: String, plugins: Vec<PluginConfig> }

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file '{}'", path))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let raw_zones = parse_zones(&lex(content))?;
        if raw_zones.is_empty() {
            bail!("Corefile defines no server blocks");
        }

        let mut zones = Vec::with_capacity(raw_zones.len());
        for raw in raw_zones {
            port_of(&raw.name)?;
            let mut plugins = raw.plugins
                .iter()
                .map(create_plugin)
                .collect::<Result<Vec<_>>>()
                .with_context(|| format!("in server block '{}'", raw.name))?;
            // chain order follows plugin priority, not Corefile order
            plugins.sort_by(|a, b| b.priority().cmp(&a.priority()));
            zones.push(ZoneConfig { name: raw.name, plugins });
        }
        Ok(Config { zones })
    }
}

fn lex(input: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\n' => tokens.push(Token::Newline),
            '{' => tokens.push(Token::OpenBrace),
            '}' => tokens.push(Token::CloseBrace),
            '#' => {
                while chars.next_if(|&c| c != '\n').is_some() {}
            }
            '"' => {
                let text: String = chars.by_ref().take_while(|&c| c != '"').collect();
                tokens.push(Token::Text(text));
            }
            c if c.is_whitespace() => {}
            c => {
                let mut text = String::from(c);
                while let Some(c) = chars.next_if(|&c| !c.is_whitespace() && !matches!(c, '#' | '{' | '}' | '"')) {
                    text.push(c);
                }
                tokens.push(Token::Text(text));
            }
        }
    }
    tokens
}

/// Server blocks: one or more zone keys on a line followed by a `{ ... }` block.
fn parse_zones(tokens: &[Token]) -> Result<Vec<RawZone>> {
    let mut i = 0;
    let mut zones = Vec::new();
    let mut keys = Vec::new();
    while i < tokens.len() {
        match &tokens[i] {
            Token::Text(s) => { keys.push(s.clone()); i += 1; }
            Token::OpenBrace => {
                if keys.is_empty() { bail!("server block without a zone key"); }
                let (plugins, next) = parse_block(tokens, i + 1)?;
                i = next;
                for name in keys.drain(..) {
                    zones.push(RawZone { name, plugins: plugins.clone() });
                }
            }
            Token::Newline => { i += 1; }
            Token::CloseBrace => bail!("unexpected '}}' outside of a server block"),
        }
    }
    if !keys.is_empty() {
        bail!("zone key(s) {:?} have no block", keys);
    }
    Ok(zones)
}

/// Parses directives until the matching `}`; returns them and the index after it.
fn parse_block(tokens: &[Token], mut i: usize) -> Result<(Vec<PluginConfig>, usize)> {
    let mut plugins = Vec::new();
    while i < tokens.len() {
        match &tokens[i] {
            Token::Newline => { i += 1; }
            Token::CloseBrace => return Ok((plugins, i + 1)),
            Token::OpenBrace => bail!("block opened without a directive"),
            Token::Text(name) => {
                i += 1;
                let mut directive = PluginConfig { name: name.clone(), args: Vec::new(), block: Vec::new() };
                while let Some(token) = tokens.get(i) {
                    match token {
                        Token::Text(arg) => { directive.args.push(arg.clone()); i += 1; }
                        Token::OpenBrace => {
                            let (block, next) = parse_block(tokens, i + 1)?;
                            directive.block = block;
                            i = next;
                            break;
                        }
                        Token::Newline | Token::CloseBrace => break,
                    }
                }
                plugins.push(directive);
            }
        }
    }
    bail!("unclosed block")
}
