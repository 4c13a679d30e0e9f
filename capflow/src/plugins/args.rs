/*!
Plugin argument handling.

Arguments are passed to plugins as a single string of comma separated `key=value` pairs. The
first entry may omit the key, it then becomes the default value:

`default_value,opt1=val1,opt2=val2`

Values containing commas or equal signs can be quoted with `"`, `'` or `` ` ``.
*/

use std::fmt;

use hashbrown::HashMap;

use crate::error::{Error, ErrorKind, ErrorOrigin, Result};

const VALID_QUOTES: &str = "\"'`";
const DEFAULT_KEY: &str = "default";

/// Arguments of a plugin
///
/// # Examples
///
/// Construct from a string:
/// ```
/// use capflow::plugins::Args;
///
/// let args: Args = "test0,opt1=test1,opt2=\"a,b\"".parse().unwrap();
/// assert_eq!(args.get_default(), Some("test0"));
/// assert_eq!(args.get("opt2"), Some("a,b"));
/// ```
///
/// Construct as builder:
/// ```
/// use capflow::plugins::Args;
///
/// let args = Args::new()
///     .insert("arg1", "test1")
///     .insert("arg2", "test2");
/// assert_eq!(args.to_string(), "arg1=test1,arg2=test2");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde_derive", derive(::serde::Serialize, ::serde::Deserialize))]
pub struct Args {
    map: HashMap<String, String>,
}

/// Arguments passed to connector plugins.
pub type ConnectorArgs = Args;

/// Arguments passed to OS plugins.
pub type OsArgs = Args;

impl Args {
    /// Creates an empty `Args` struct.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a `Args` struct with a default (unnamed) value.
    pub fn with_default(value: &str) -> Self {
        Self::new().insert(DEFAULT_KEY, value)
    }

    /// Consumes self, inserts the given key-value pair and returns the self again.
    ///
    /// An existing value of the same key is replaced.
    pub fn insert(mut self, key: &str, value: &str) -> Self {
        self.map.insert(key.to_string(), value.to_string());
        self
    }

    /// Tries to retrieve an entry from the options map.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.map.get(key).map(String::as_str)
    }

    /// Tries to retrieve the default entry from the options map.
    ///
    /// This function is a convenience wrapper for `args.get("default")`.
    pub fn get_default(&self) -> Option<&str> {
        self.get(DEFAULT_KEY)
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Iterates over all entries, the default value included.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.map.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

fn quote(value: &str) -> String {
    if value.contains(',') || value.contains('=') {
        if value.contains('"') {
            format!("'{}'", value)
        } else {
            format!("\"{}\"", value)
        }
    } else {
        value.to_string()
    }
}

impl fmt::Display for Args {
    /// Generates a string that parses back into the same arguments.
    ///
    /// The default value goes first, the remaining entries are sorted by key.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut result = Vec::new();

        if let Some(default) = self.get_default() {
            result.push(quote(default));
        }

        let mut entries = self
            .map
            .iter()
            .filter(|(k, _)| k.as_str() != DEFAULT_KEY)
            .collect::<Vec<_>>();
        entries.sort();

        result.extend(
            entries
                .into_iter()
                .map(|(key, value)| format!("{}={}", key, quote(value))),
        );

        write!(f, "{}", result.join(","))
    }
}

impl std::str::FromStr for Args {
    type Err = Error;

    /// Parses an argument string.
    ///
    /// Empty entries are skipped. Fails with [`ErrorKind::ArgValidation`] on unterminated quotes,
    /// empty keys and entries without a key anywhere but in the first position.
    fn from_str(s: &str) -> Result<Self> {
        let mut map = HashMap::new();

        for (i, kv) in split_str_args(s, ',')?.into_iter().enumerate() {
            if kv.is_empty() {
                continue;
            }

            let parts = split_str_args(kv, '=')?;
            if parts.len() < 2 {
                if i != 0 {
                    return Err(Error(ErrorOrigin::Args, ErrorKind::ArgValidation)
                        .log_error(format!("argument `{}` is missing a key", kv)));
                }
                map.insert(DEFAULT_KEY.to_string(), unquote(kv).to_string());
            } else {
                let key = parts[0];
                if key.is_empty() {
                    return Err(Error(ErrorOrigin::Args, ErrorKind::ArgValidation)
                        .log_error(format!("argument `{}` has an empty key", kv)));
                }
                let value = &kv[key.len() + 1..];
                map.insert(unquote(key).to_string(), unquote(value).to_string());
            }
        }

        Ok(Self { map })
    }
}

impl TryFrom<&str> for Args {
    type Error = Error;

    fn try_from(args: &str) -> Result<Self> {
        args.parse()
    }
}

impl From<Args> for String {
    fn from(args: Args) -> Self {
        args.to_string()
    }
}

/// Splits `inp` on every `split_char` outside of quotes.
///
/// Quotes are kept in the returned parts. A backslash in front of a quote escapes it.
///
/// # Examples
///
/// ```
/// use capflow::plugins::args::split_str_args;
///
/// assert_eq!(split_str_args("a:b:c", ':').unwrap(), ["a", "b", "c"]);
/// assert_eq!(split_str_args("a::c", ':').unwrap(), ["a", "", "c"]);
/// assert_eq!(split_str_args("a:\"hel:lo\":c", ':').unwrap(), ["a", "\"hel:lo\"", "c"]);
/// assert!(split_str_args("a:\"hel:lo:c", ':').is_err());
/// ```
pub fn split_str_args(inp: &str, split_char: char) -> Result<Vec<&str>> {
    let mut parts = vec![];
    let mut quotation_char = None;
    let mut prev_char = '\0';
    let mut start = 0;

    for (i, c) in inp.char_indices() {
        // found an unescaped quote
        if VALID_QUOTES.contains(c) && prev_char != '\\' {
            match quotation_char {
                Some(qc) if qc == c => quotation_char = None,
                None => quotation_char = Some(c),
                _ => (),
            }
        }

        if quotation_char.is_none() && c == split_char {
            parts.push(&inp[start..i]);
            start = i + c.len_utf8();
        }

        prev_char = c;
    }

    if quotation_char.is_some() {
        return Err(Error(ErrorOrigin::Args, ErrorKind::ArgValidation)
            .log_error(format!("unterminated quote in `{}`", inp)));
    }

    parts.push(&inp[start..]);
    Ok(parts)
}

/// Strips one pair of matching quotes around `s`.
fn unquote(s: &str) -> &str {
    match s.chars().next() {
        Some(c) if VALID_QUOTES.contains(c) && s.len() >= 2 && s.ends_with(c) => &s[1..s.len() - 1],
        _ => s,
    }
}

pub type ArgValidator = Box<dyn Fn(&str) -> ::std::result::Result<(), &'static str>>;

/// Validator for plugin arguments
///
/// # Examples
///
/// ```
/// use capflow::plugins::args::{ArgDescriptor, ArgsValidator};
/// use capflow::plugins::Args;
///
/// let validator = ArgsValidator::new()
///     .arg(ArgDescriptor::new("default"))
///     .arg(ArgDescriptor::new("size").required(true));
///
/// assert!(validator.validate(&"size=4m".parse::<Args>().unwrap()).is_ok());
/// assert!(validator.validate(&Args::new()).is_err());
/// ```
#[derive(Debug, Default)]
pub struct ArgsValidator {
    args: Vec<ArgDescriptor>,
}

impl ArgsValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an `ArgDescriptor` to the validator and returns itself.
    pub fn arg(mut self, arg: ArgDescriptor) -> Self {
        self.args.push(arg);
        self
    }

    pub fn validate(&self, args: &Args) -> Result<()> {
        // unknown arguments
        for (key, _) in args.iter() {
            if !self.args.iter().any(|a| a.name == key) {
                return Err(Error(ErrorOrigin::Args, ErrorKind::ArgNotExists)
                    .log_error(format!("argument {} does not exist", key)));
            }
        }

        for arg in self.args.iter() {
            let value = args.get(&arg.name);

            if arg.required && value.is_none() {
                return Err(Error(ErrorOrigin::Args, ErrorKind::RequiredArgNotFound).log_error(
                    format!("argument {} is required but could not be found", arg.name),
                ));
            }

            if let (Some(validator), Some(value)) = (&arg.validator, value) {
                if let Err(err) = validator(value) {
                    return Err(Error(ErrorOrigin::Args, ErrorKind::ArgValidation)
                        .log_error(format!("argument {} is invalid: {}", arg.name, err)));
                }
            }
        }

        Ok(())
    }
}

impl fmt::Display for ArgsValidator {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let lines = self.args.iter().map(ToString::to_string).collect::<Vec<_>>();
        write!(f, "{}", lines.join("\n"))
    }
}

/// Describes a single validator argument.
pub struct ArgDescriptor {
    pub name: String,
    pub description: Option<String>,
    pub required: bool,
    pub validator: Option<ArgValidator>,
}

impl ArgDescriptor {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            description: None,
            required: false,
            validator: None,
        }
    }

    pub fn description(mut self, description: &str) -> Self {
        self.description = Some(description.to_owned());
        self
    }

    /// By default arguments are optional.
    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    pub fn validator(mut self, validator: ArgValidator) -> Self {
        self.validator = Some(validator);
        self
    }
}

impl fmt::Display for ArgDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}: {}{}",
            self.name,
            self.description
                .as_deref()
                .unwrap_or("no description available"),
            if self.required { " (required)" } else { "" },
        )
    }
}

impl fmt::Debug for ArgDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    pub fn from_str() {
        let args: Args = "opt1=test1,opt2=test2,opt3=test3".parse().unwrap();
        assert_eq!(args.get("opt1").unwrap(), "test1");
        assert_eq!(args.get("opt2").unwrap(), "test2");
        assert_eq!(args.get("opt3").unwrap(), "test3");
        assert_eq!(args.get_default(), None);
    }

    #[test]
    pub fn from_str_default() {
        let args: Args = "test0,opt1=test1".parse().unwrap();
        assert_eq!(args.get_default().unwrap(), "test0");
        assert_eq!(args.get("opt1").unwrap(), "test1");
    }

    #[test]
    pub fn default_only_first() {
        let res = "opt1=test1,test0".parse::<Args>();
        assert_eq!(
            res,
            Err(Error(ErrorOrigin::Args, ErrorKind::ArgValidation))
        );
    }

    #[test]
    pub fn empty() {
        let args: Args = "".parse().unwrap();
        assert!(args.is_empty());
        assert_eq!(args.to_string(), "");
    }

    #[test]
    pub fn empty_key() {
        assert!("=value".parse::<Args>().is_err());
    }

    #[test]
    pub fn unterminated_quote() {
        assert_eq!(
            "opt1=\"test1,opt2=test2".parse::<Args>(),
            Err(Error(ErrorOrigin::Args, ErrorKind::ArgValidation))
        );
    }

    #[test]
    pub fn case_sensitive_keys() {
        let args: Args = "Size=1,size=2".parse().unwrap();
        assert_eq!(args.get("Size"), Some("1"));
        assert_eq!(args.get("size"), Some("2"));
    }

    #[test]
    pub fn to_string_round_trip() {
        let args: Args = "test0,opt2=test2,opt1=\"a,b=c\"".parse().unwrap();
        assert_eq!(args.to_string(), "test0,opt1=\"a,b=c\",opt2=test2");
        let args2: Args = args.to_string().parse().unwrap();
        assert_eq!(args, args2);
    }

    #[test]
    pub fn unquoted_equal_sign_in_value() {
        let args: Args = "remote=rpc://ip=127.0.0.1:computer".parse().unwrap();
        assert_eq!(args.get("remote"), Some("rpc://ip=127.0.0.1:computer"));
    }

    #[test]
    pub fn mixed_quotes() {
        let args: Args = "device=`RAWUDP://ip=127.0.0.1`".parse().unwrap();
        assert_eq!(args.get("device").unwrap(), "RAWUDP://ip=127.0.0.1");
        assert_eq!(args.to_string(), "device=\"RAWUDP://ip=127.0.0.1\"");
    }

    #[test]
    pub fn builder() {
        let args = Args::with_default("x").insert("arg1", "test1").insert("arg1", "test2");
        assert_eq!(args.get_default(), Some("x"));
        assert_eq!(args.get("arg1"), Some("test2"));
    }

    #[test]
    pub fn validator() {
        let validator = ArgsValidator::new()
            .arg(ArgDescriptor::new("default"))
            .arg(ArgDescriptor::new("opt1").validator(Box::new(|arg| {
                match arg == "valid" {
                    true => Ok(()),
                    false => Err("argument must be 'valid'"),
                }
            })));

        assert_eq!(validator.validate(&"test0,opt1=valid".parse().unwrap()), Ok(()));
        assert_eq!(
            validator.validate(&"opt1=invalid".parse().unwrap()),
            Err(Error(ErrorOrigin::Args, ErrorKind::ArgValidation))
        );
        assert_eq!(
            validator.validate(&"opt2=x".parse().unwrap()),
            Err(Error(ErrorOrigin::Args, ErrorKind::ArgNotExists))
        );
    }

    #[test]
    pub fn validator_required() {
        let validator = ArgsValidator::new().arg(ArgDescriptor::new("opt1").required(true));
        assert_eq!(
            validator.validate(&Args::new()),
            Err(Error(ErrorOrigin::Args, ErrorKind::RequiredArgNotFound))
        );
    }
}
