//-
// Copyright (c) 2023, Jason Lingle
//
// This file is part of Aliasmap.
//
// Aliasmap is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free
// Software Foundation, either version 3 of the License, or (at your option)
// any later version.
//
// Aliasmap is distributed in the hope that it will be useful, but WITHOUT ANY
// WARRANTY; without  even the implied  warranty of MERCHANTABILITY  or FITNESS
// FOR  A PARTICULAR  PURPOSE.  See the  GNU General  Public  License for  more
// details.
//
// You should have received a copy of the GNU General Public License along with
// Aliasmap. If not, see <http://www.gnu.org/licenses/>.

//! RFC 5322 mailbox syntax.
//!
//! This recognises the `mailbox` production (`name-addr / addr-spec`),
//! including the obsolete local-part and phrase forms that real agents still
//! emit, and extracts the bare address. Source routes are not supported.

use nom::{
    branch::alt,
    bytes::complete::{take, take_while1},
    character::complete::char,
    combinator::{all_consuming, map, opt},
    error::ErrorKind,
    multi::{fold_many0, many0, many1, separated_nonempty_list},
    sequence::{delimited, pair, preceded, terminated},
    IResult,
};

// Deeper comment nesting than this is rejected rather than recursed into.
const MAX_COMMENT_DEPTH: u32 = 32;

/// The address part of a mailbox.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AddrSpec {
    pub local: Vec<Vec<u8>>,
    pub domain: Vec<Vec<u8>>,
}

impl AddrSpec {
    /// Render as `local@domain`, with quoting and comments removed.
    pub fn to_address(&self) -> String {
        let local = self.local.join(&b'.');
        let domain = self.domain.join(&b'.');
        format!(
            "{}@{}",
            String::from_utf8_lossy(&local),
            String::from_utf8_lossy(&domain)
        )
    }
}

/// Parse `s` as a single RFC 5322 mailbox.
pub fn parse_mailbox(s: &str) -> Option<AddrSpec> {
    all_consuming(mailbox)(s.as_bytes()).ok().map(|(_, a)| a)
}

pub fn is_mailbox(s: &str) -> bool {
    parse_mailbox(s).is_some()
}

fn is_ws(ch: u8) -> bool {
    b' ' == ch || b'\t' == ch || b'\r' == ch || b'\n' == ch
}

// RFC 5322 3.2.3 "atext"
// Amended by RFC 6532 to include all non-ASCII characters
fn is_atext(ch: u8) -> bool {
    ch.is_ascii_alphanumeric()
        || b"!#$%&'*+-/=?^_`{|}~".contains(&ch)
        || ch >= 0x80
}

// RFC 5322 3.2.1 "quoted-pair", including the 8-bit clean obsolete syntax
fn quoted_pair(i: &[u8]) -> IResult<&[u8], &[u8]> {
    preceded(char('\\'), take(1usize))(i)
}

// RFC 5322 3.2.2 "Folding white space". Line folding has no special meaning
// here, so any run of white space collapses to one space.
fn fws(i: &[u8]) -> IResult<&[u8], &[u8]> {
    map(take_while1(is_ws), |_| &b" "[..])(i)
}

// RFC 5322 3.2.2 "Comment text"
fn ctext(i: &[u8]) -> IResult<&[u8], &[u8]> {
    take_while1(|ch: u8| {
        !is_ws(ch) && b'(' != ch && b')' != ch && b'\\' != ch
    })(i)
}

// RFC 5322 3.2.2 "Comment". Comments nest.
fn comment(i: &[u8]) -> IResult<&[u8], ()> {
    nested_comment(i, 0)
}

fn nested_comment(i: &[u8], depth: u32) -> IResult<&[u8], ()> {
    if depth >= MAX_COMMENT_DEPTH {
        return Err(nom::Err::Failure((i, ErrorKind::TooLarge)));
    }

    let (mut i, _) = punct('(', i)?;
    loop {
        if let Ok((rest, _)) = alt((ctext, quoted_pair, fws))(i) {
            i = rest;
            continue;
        }

        match nested_comment(i, depth + 1) {
            Ok((rest, ())) => i = rest,
            Err(nom::Err::Error(_)) => break,
            Err(e) => return Err(e),
        }
    }

    let (i, _) = punct(')', i)?;
    Ok((i, ()))
}

fn punct(c: char, i: &[u8]) -> IResult<&[u8], char> {
    char(c)(i)
}

// RFC 5322 3.2.2 "Comment or folding white space"
// Unlike the RFC, this never matches the empty string; use `opt(cfws)`.
fn cfws(i: &[u8]) -> IResult<&[u8], ()> {
    map(many1(alt((map(fws, |_| ()), comment))), |_| ())(i)
}

// RFC 5322 3.2.3 "Atom"
fn atom(i: &[u8]) -> IResult<&[u8], &[u8]> {
    delimited(opt(cfws), take_while1(is_atext), opt(cfws))(i)
}

// RFC 5322 3.2.4 "qtext"
fn qtext(i: &[u8]) -> IResult<&[u8], &[u8]> {
    take_while1(|ch: u8| !is_ws(ch) && b'\\' != ch && b'"' != ch)(i)
}

// RFC 5322 3.2.4 "Quoted string", returning the unquoted content
fn quoted_string(i: &[u8]) -> IResult<&[u8], Vec<u8>> {
    delimited(
        pair(opt(cfws), char('"')),
        fold_many0(
            alt((qtext, quoted_pair, fws)),
            Vec::new(),
            |mut acc: Vec<u8>, item: &[u8]| {
                acc.extend_from_slice(item);
                acc
            },
        ),
        pair(char('"'), opt(cfws)),
    )(i)
}

// RFC 5322 3.2.5 "word"
fn word(i: &[u8]) -> IResult<&[u8], Vec<u8>> {
    alt((map(atom, |a: &[u8]| a.to_vec()), quoted_string))(i)
}

// RFC 5322 4.1 "obs-phrase" allows unquoted periods, which many agents put
// into display names.
fn phrase(i: &[u8]) -> IResult<&[u8], ()> {
    let obs_dot = terminated(map(char('.'), |_| b".".to_vec()), opt(cfws));
    map(pair(word, many0(alt((word, obs_dot)))), |_| ())(i)
}

// RFC 5322 3.4.1 local part, as `obs-local-part`, which is a superset of
// `dot-atom / quoted-string`.
fn local_part(i: &[u8]) -> IResult<&[u8], Vec<Vec<u8>>> {
    separated_nonempty_list(char('.'), word)(i)
}

// RFC 5322 3.4.1 "dtext"
fn dtext(i: &[u8]) -> IResult<&[u8], &[u8]> {
    take_while1(|ch: u8| {
        !is_ws(ch) && b'[' != ch && b']' != ch && b'\\' != ch
    })(i)
}

// RFC 5322 3.4.1 "domain-literal", brackets included in the result
fn domain_literal(i: &[u8]) -> IResult<&[u8], Vec<u8>> {
    map(
        delimited(
            pair(opt(cfws), char('[')),
            fold_many0(
                alt((dtext, quoted_pair, fws)),
                Vec::new(),
                |mut acc: Vec<u8>, item: &[u8]| {
                    acc.extend_from_slice(item);
                    acc
                },
            ),
            pair(char(']'), opt(cfws)),
        ),
        |content| {
            let mut literal = Vec::with_capacity(content.len() + 2);
            literal.push(b'[');
            literal.extend_from_slice(&content);
            literal.push(b']');
            literal
        },
    )(i)
}

// RFC 5322 3.4.1 "domain", with `obs-domain` covering `dot-atom`
fn domain(i: &[u8]) -> IResult<&[u8], Vec<Vec<u8>>> {
    alt((
        separated_nonempty_list(char('.'), map(atom, |a: &[u8]| a.to_vec())),
        map(domain_literal, |literal| vec![literal]),
    ))(i)
}

// RFC 5322 3.4.1 "addr-spec"
fn addr_spec(i: &[u8]) -> IResult<&[u8], AddrSpec> {
    map(
        pair(local_part, preceded(char('@'), domain)),
        |(local, domain)| AddrSpec { local, domain },
    )(i)
}

// RFC 5322 3.4 "angle-addr"
fn angle_addr(i: &[u8]) -> IResult<&[u8], AddrSpec> {
    delimited(
        pair(opt(cfws), char('<')),
        addr_spec,
        pair(char('>'), opt(cfws)),
    )(i)
}

// RFC 5322 3.4 "mailbox"
fn mailbox(i: &[u8]) -> IResult<&[u8], AddrSpec> {
    alt((preceded(opt(phrase), angle_addr), addr_spec))(i)
}
