use nom::{
    branch::alt,
    bytes::complete::{tag, tag_no_case, take_while1},
    character::complete::{char, digit1, multispace0, multispace1},
    combinator::{map, map_opt, opt, recognize},
    multi::{separated_list0, separated_list1},
    sequence::{delimited, preceded, separated_pair, tuple},
    IResult,
};

use crate::error::ParseError;
use crate::model::{day_to_date, parse_day};

/// REPL commands.
#[derive(Debug, PartialEq, Clone)]
pub enum Command {
    Show { code: Option<String> },
    Toggle { code: String, key: f64 },
    /// `None` resets every facet.
    Reset { code: Option<String> },
    /// Programmatic range in key units; `None` clears the brush.
    Brush { code: String, range: Option<(f64, f64)> },
    /// Simulated gesture in display units: start, move, end.
    Drag { code: String, from: f64, to: f64 },
    Resize { code: String, width: f64 },
    Link,
    Restore { link: String },
    Help,
    Exit,
}

/// Value of one facet in a shareable link.
#[derive(Debug, PartialEq, Clone)]
pub enum LinkValue {
    Keys(Vec<f64>),
    Range(f64, f64),
}

/// How keys of an entry are written back out. Parsing always yields
/// `Number`, since date literals are read as day numbers.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub enum KeyFormat {
    #[default]
    Number,
    /// Day numbers written as `YYYY-MM-DD`.
    Date,
}

#[derive(Debug, PartialEq, Clone)]
pub struct LinkEntry {
    pub code: String,
    pub value: LinkValue,
    pub format: KeyFormat,
}

// --- BASIC PARSERS ---

fn parse_number(input: &str) -> IResult<&str, f64> {
    let (input, num_str) = recognize(tuple((
        opt(char('-')),
        digit1,
        opt(tuple((char('.'), digit1))),
    )))(input)?;
    match num_str.parse::<f64>() {
        Ok(n) => Ok((input, n)),
        Err(_) => Err(nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Float))),
    }
}

/// `YYYY-MM-DD` as a day number.
fn parse_date(input: &str) -> IResult<&str, f64> {
    map_opt(
        recognize(tuple((digit1, char('-'), digit1, char('-'), digit1))),
        |s: &str| parse_day(s).map(|d| d as f64),
    )(input)
}

/// A facet key: a date literal or a plain number.
fn parse_key(input: &str) -> IResult<&str, f64> {
    alt((parse_date, parse_number))(input)
}

fn parse_range(input: &str) -> IResult<&str, (f64, f64)> {
    separated_pair(parse_key, tag(".."), parse_key)(input)
}

fn parse_code(input: &str) -> IResult<&str, String> {
    map(take_while1(|c: char| c.is_alphanumeric() || c == '_'), str::to_string)(input)
}

// --- HELPERS ---
fn ws<'a, F, O, E: nom::error::ParseError<&'a str>>(inner: F) -> impl FnMut(&'a str) -> IResult<&'a str, O, E>
where F: FnMut(&'a str) -> IResult<&'a str, O, E> {
    delimited(multispace0, inner, multispace0)
}

fn tag_ci(t: &'static str) -> impl FnMut(&str) -> IResult<&str, &str> {
    move |input| tag_no_case(t)(input)
}

// --- LINK ---

fn parse_link_value(input: &str) -> IResult<&str, LinkValue> {
    alt((
        map(parse_range, |(lo, hi)| LinkValue::Range(lo, hi)),
        map(separated_list1(char(','), parse_key), LinkValue::Keys),
    ))(input)
}

fn parse_link_entry(input: &str) -> IResult<&str, LinkEntry> {
    map(
        separated_pair(parse_code, char('='), parse_link_value),
        |(code, value)| LinkEntry { code, value, format: KeyFormat::Number },
    )(input)
}

fn parse_link_entries(input: &str) -> IResult<&str, Vec<LinkEntry>> {
    preceded(opt(char('?')), separated_list0(char('&'), parse_link_entry))(input)
}

/// Parse `code=k1,k2&code=lo..hi`. The empty string means no selections.
pub fn parse_link(input: &str) -> Result<Vec<LinkEntry>, ParseError> {
    let input = input.trim();
    match parse_link_entries(input) {
        Ok((remainder, entries)) if remainder.is_empty() => Ok(entries),
        Ok((remainder, _)) => Err(ParseError(format!("Unexpected link text: '{}'", remainder))),
        Err(_) => Err(ParseError(format!("Invalid link: '{}'", input))),
    }
}

/// Inverse of [`parse_link`]. Integral keys are written without a fraction,
/// and as date literals when the entry asks for it.
pub fn format_link(entries: &[LinkEntry]) -> String {
    entries
        .iter()
        .map(|entry| {
            let key = |k: f64| format_key(k, entry.format);
            let value = match &entry.value {
                LinkValue::Keys(keys) => keys.iter().map(|k| key(*k)).collect::<Vec<_>>().join(","),
                LinkValue::Range(lo, hi) => format!("{}..{}", key(*lo), key(*hi)),
            };
            format!("{}={}", entry.code, value)
        })
        .collect::<Vec<_>>()
        .join("&")
}

fn format_key(key: f64, format: KeyFormat) -> String {
    if key.fract() != 0.0 || key.abs() >= 1e15 {
        return format!("{}", key);
    }
    let day = key as i64;
    match format {
        KeyFormat::Date => day_to_date(day)
            .map_or_else(|| day.to_string(), |d| d.format("%Y-%m-%d").to_string()),
        KeyFormat::Number => day.to_string(),
    }
}

// --- COMMAND PARSERS ---

fn parse_show(input: &str) -> IResult<&str, Command> {
    let (input, _) = tag_ci("SHOW")(input)?;
    let (input, code) = opt(preceded(multispace1, parse_code))(input)?;
    Ok((input, Command::Show { code }))
}

fn parse_toggle(input: &str) -> IResult<&str, Command> {
    let (input, _) = tag_ci("TOGGLE")(input)?;
    let (input, code) = preceded(multispace1, parse_code)(input)?;
    let (input, key) = preceded(multispace1, parse_key)(input)?;
    Ok((input, Command::Toggle { code, key }))
}

fn parse_reset(input: &str) -> IResult<&str, Command> {
    let (input, _) = tag_ci("RESET")(input)?;
    let (input, code) = opt(preceded(multispace1, parse_code))(input)?;
    let code = code.filter(|c| !c.eq_ignore_ascii_case("ALL"));
    Ok((input, Command::Reset { code }))
}

fn parse_brush(input: &str) -> IResult<&str, Command> {
    let (input, _) = tag_ci("BRUSH")(input)?;
    let (input, code) = preceded(multispace1, parse_code)(input)?;
    let (input, _) = multispace1(input)?;
    let (input, range) = alt((
        map(tag_ci("NONE"), |_| None),
        map(parse_range, Some),
    ))(input)?;
    Ok((input, Command::Brush { code, range }))
}

fn parse_drag(input: &str) -> IResult<&str, Command> {
    let (input, _) = tag_ci("DRAG")(input)?;
    let (input, code) = preceded(multispace1, parse_code)(input)?;
    let (input, from) = preceded(multispace1, parse_number)(input)?;
    let (input, to) = preceded(multispace1, parse_number)(input)?;
    Ok((input, Command::Drag { code, from, to }))
}

fn parse_resize(input: &str) -> IResult<&str, Command> {
    let (input, _) = tag_ci("RESIZE")(input)?;
    let (input, code) = preceded(multispace1, parse_code)(input)?;
    let (input, width) = preceded(multispace1, parse_number)(input)?;
    Ok((input, Command::Resize { code, width }))
}

fn parse_link_cmd(input: &str) -> IResult<&str, Command> {
    let (input, _) = tag_ci("LINK")(input)?;
    Ok((input, Command::Link))
}

fn parse_restore(input: &str) -> IResult<&str, Command> {
    let (input, _) = tag_ci("RESTORE")(input)?;
    let (input, link) = opt(preceded(multispace1, take_while1(|c: char| !c.is_whitespace())))(input)?;
    Ok((input, Command::Restore { link: link.unwrap_or_default().to_string() }))
}

fn parse_help(input: &str) -> IResult<&str, Command> {
    let (input, _) = tag_ci("HELP")(input)?;
    Ok((input, Command::Help))
}

fn parse_exit(input: &str) -> IResult<&str, Command> {
    let (input, _) = alt((tag_ci("EXIT"), tag_ci("QUIT")))(input)?;
    Ok((input, Command::Exit))
}

pub fn parse_command(input: &str) -> Result<Command, ParseError> {
    let input = input.trim();
    let result = ws(alt((
        parse_show,
        parse_toggle,
        parse_reset,
        parse_brush,
        parse_drag,
        parse_resize,
        parse_link_cmd,
        parse_restore,
        parse_help,
        parse_exit,
    )))(input);

    match result {
        Ok((remainder, cmd)) => {
            if !remainder.trim().is_empty() {
                return Err(ParseError(format!("Unexpected tokens at end: '{}'", remainder)));
            }
            Ok(cmd)
        },
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => {
            let context = if e.input.len() > 20 {
                format!("{}...", e.input.chars().take(20).collect::<String>())
            } else {
                e.input.to_string()
            };
            Err(ParseError(format!("Invalid syntax near: '{}'", context)))
        },
        Err(nom::Err::Incomplete(_)) => Err(ParseError("Incomplete command.".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_are_case_insensitive() {
        assert_eq!(
            parse_command("toggle weekDay 0").unwrap(),
            Command::Toggle { code: "weekDay".into(), key: 0.0 }
        );
        assert_eq!(parse_command("SHOW").unwrap(), Command::Show { code: None });
        assert_eq!(parse_command("reset all").unwrap(), Command::Reset { code: None });
        assert_eq!(
            parse_command("RESET hour").unwrap(),
            Command::Reset { code: Some("hour".into()) }
        );
        assert_eq!(parse_command("quit").unwrap(), Command::Exit);
    }

    #[test]
    fn brush_accepts_dates_and_none() {
        let day = parse_day("2017-10-03").unwrap() as f64;
        assert_eq!(
            parse_command("BRUSH date 2017-10-03..2017-10-05").unwrap(),
            Command::Brush { code: "date".into(), range: Some((day, day + 2.0)) }
        );
        assert_eq!(
            parse_command("BRUSH date none").unwrap(),
            Command::Brush { code: "date".into(), range: None }
        );
    }

    #[test]
    fn negative_keys_and_drag() {
        assert_eq!(
            parse_command("TOGGLE x_last_delay_arrival -12").unwrap(),
            Command::Toggle { code: "x_last_delay_arrival".into(), key: -12.0 }
        );
        assert_eq!(
            parse_command("DRAG date 10.5 400").unwrap(),
            Command::Drag { code: "date".into(), from: 10.5, to: 400.0 }
        );
    }

    #[test]
    fn trailing_garbage_is_reported() {
        let err = parse_command("LINK now please").unwrap_err();
        assert!(err.0.starts_with("Unexpected tokens"));
        assert!(parse_command("FLY away").is_err());
    }

    #[test]
    fn link_parses_keys_and_ranges() {
        let entries = parse_link("?weekDay=0,6&x_max_delay_arrival=-12&date=17440..17443").unwrap();
        assert_eq!(
            entries,
            vec![
                LinkEntry { code: "weekDay".into(), value: LinkValue::Keys(vec![0.0, 6.0]), format: KeyFormat::Number },
                LinkEntry { code: "x_max_delay_arrival".into(), value: LinkValue::Keys(vec![-12.0]), format: KeyFormat::Number },
                LinkEntry { code: "date".into(), value: LinkValue::Range(17440.0, 17443.0), format: KeyFormat::Number },
            ]
        );
        assert_eq!(
            format_link(&entries),
            "weekDay=0,6&x_max_delay_arrival=-12&date=17440..17443"
        );
    }

    #[test]
    fn date_entries_are_written_as_literals() {
        let day = parse_day("2017-10-03").unwrap() as f64;
        let entries = vec![
            LinkEntry { code: "date".into(), value: LinkValue::Range(day, day + 2.0), format: KeyFormat::Date },
            LinkEntry { code: "hour".into(), value: LinkValue::Keys(vec![6.0]), format: KeyFormat::Number },
        ];
        let link = format_link(&entries);
        assert_eq!(link, "date=2017-10-03..2017-10-05&hour=6");

        let parsed = parse_link(&link).unwrap();
        assert_eq!(parsed[0].value, LinkValue::Range(day, day + 2.0));
    }

    #[test]
    fn empty_link_has_no_entries() {
        assert_eq!(parse_link("").unwrap(), vec![]);
        assert!(parse_link("weekDay=").is_err());
    }
}
