//! Module subject parsing and matching.

use std::fmt::Display;
use std::fmt::Formatter;
use std::str::FromStr;

use winnow::ModalResult;
use winnow::Parser;
use winnow::combinator::eof;
use winnow::combinator::opt;
use winnow::combinator::preceded;
use winnow::error::AddContext;
use winnow::error::ContextError;
use winnow::error::ErrMode;
use winnow::error::ParserError;
use winnow::error::StrContext;
use winnow::error::StrContextValue;
use winnow::stream::Stream as _;
use winnow::token::literal;
use winnow::token::take_while;

use crate::Error;
use crate::ModulePackage;

/// Returns whether `c` may appear in a subject field.
fn is_field_char(c: char) -> bool {
    c != ':' && c != '/'
}

/// A parsed module subject.
///
/// Subjects follow the grammar
/// `name[:stream[:version[:context]]][::arch][/profile]`. Fields that are
/// absent or empty act as wildcards when matching module packages. The
/// profile suffix is accepted but ignored for matching.
///
/// ## Examples
/// ```
/// use std::str::FromStr;
///
/// use modpkg_types::Nsvcap;
///
/// let subject = Nsvcap::from_str("httpd:2.4::x86_64/default")?;
/// assert_eq!(subject.name, "httpd");
/// assert_eq!(subject.stream.as_deref(), Some("2.4"));
/// assert_eq!(subject.version, None);
/// assert_eq!(subject.arch.as_deref(), Some("x86_64"));
/// assert_eq!(subject.profile.as_deref(), Some("default"));
/// # Ok::<(), modpkg_types::Error>(())
/// ```
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq)]
pub struct Nsvcap {
    /// The module name.
    pub name: String,
    /// The requested stream, if any.
    pub stream: Option<String>,
    /// The requested version, if any.
    pub version: Option<u64>,
    /// The requested context, if any.
    pub context: Option<String>,
    /// The requested architecture, if any.
    pub arch: Option<String>,
    /// The requested profile, if any. Ignored when matching packages.
    pub profile: Option<String>,
}

impl Nsvcap {
    /// Recognizes a module subject in a string slice.
    ///
    /// Single `:` separators delimit the name, stream, version and context
    /// fields; a `::` introduces the architecture and a `/` the profile.
    pub fn parser(input: &mut &str) -> ModalResult<Self> {
        let name = take_while(1.., is_field_char)
            .context(StrContext::Label("module name"))
            .context(StrContext::Expected(StrContextValue::Description(
                "a module name, optionally followed by ':stream:version:context', '::arch' and \
                 '/profile'",
            )))
            .parse_next(input)?;

        // Up to three single-colon fields; a second colon belongs to the
        // architecture separator.
        let mut fields: Vec<&str> = Vec::new();
        while fields.len() < 3 {
            let checkpoint = input.checkpoint();
            if opt(literal(":")).parse_next(input)?.is_none() {
                break;
            }
            if input.starts_with(':') {
                input.reset(&checkpoint);
                break;
            }
            fields.push(take_while(0.., is_field_char).parse_next(input)?);
        }

        let arch = opt(preceded(literal("::"), take_while(1.., is_field_char)))
            .parse_next(input)?;
        let profile = opt(preceded(literal("/"), take_while(1.., |c| c != '/')))
            .parse_next(input)?;
        eof.context(StrContext::Expected(StrContextValue::Description(
            "end of the module subject",
        )))
        .parse_next(input)?;

        let wildcard = |field: Option<&&str>| {
            field
                .filter(|value| !value.is_empty())
                .map(|value| value.to_string())
        };
        let version = match fields.get(1).filter(|value| !value.is_empty()) {
            Some(raw) => Some(raw.parse::<u64>().map_err(|_| {
                ErrMode::Cut(ContextError::from_input(input).add_context(
                    input,
                    &input.checkpoint(),
                    StrContext::Expected(StrContextValue::Description(
                        "a numeric module version",
                    )),
                ))
            })?),
            None => None,
        };

        Ok(Nsvcap {
            name: name.to_string(),
            stream: wildcard(fields.first()),
            version,
            context: wildcard(fields.get(2)),
            arch: arch.filter(|value| !value.is_empty()).map(str::to_string),
            profile: profile.map(str::to_string),
        })
    }

    /// Returns whether `package` matches every populated field of this
    /// subject.
    ///
    /// The profile field is not considered.
    pub fn matches(&self, package: &ModulePackage) -> bool {
        if self.name != package.name.as_str() {
            return false;
        }
        if let Some(stream) = &self.stream
            && stream != package.stream.as_str()
        {
            return false;
        }
        if let Some(version) = self.version
            && version != package.version
        {
            return false;
        }
        if let Some(context) = &self.context
            && context != &package.context
        {
            return false;
        }
        if let Some(arch) = &self.arch
            && arch != &package.arch
        {
            return false;
        }
        true
    }
}

impl FromStr for Nsvcap {
    type Err = Error;

    /// Creates an [`Nsvcap`] from a string slice.
    ///
    /// # Errors
    ///
    /// Returns an error if [`Nsvcap::parser`] fails.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parser.parse(s).map_err(Error::from)
    }
}

impl Display for Nsvcap {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)?;
        let fields = [
            self.stream.clone(),
            self.version.map(|version| version.to_string()),
            self.context.clone(),
        ];
        let populated = fields.iter().rposition(Option::is_some);
        if let Some(last) = populated {
            for field in &fields[..=last] {
                write!(f, ":{}", field.as_deref().unwrap_or_default())?;
            }
        }
        if let Some(arch) = &self.arch {
            write!(f, "::{arch}")?;
        }
        if let Some(profile) = &self.profile {
            write!(f, "/{profile}")?;
        }
        Ok(())
    }
}
