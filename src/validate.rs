use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::ValidationError;
use crate::model::{Contact, NewComment, NewPost};

static HTML_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("valid tag pattern"));
static EMAIL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid email pattern"));

/// Korean slurs and insults rejected unless `moderation.builtin_words` is
/// turned off. Only unambiguous forms are listed; everyday words that merely
/// contain a rude syllable are left out.
pub const BUILTIN_WORDS: &[&str] = &[
    "씨발", "씨팔", "시발", "씨바", "씨빨", "시팔", "씹할", "개새끼", "개색끼", "개색히",
    "개세끼", "개쉐이", "개쎄끼", "씹새끼", "씹세끼", "씹쉐이", "씹쎄끼", "좆", "지랄",
    "지럴", "염병", "엠병", "옘병", "미친놈", "미친년", "미친새끼", "병신", "뱅신", "빙신",
    "븅신", "쌍년", "쌍놈", "썅년", "썅놈", "등신", "닥쳐", "꺼져", "보지", "자지",
    "빠구리", "딸딸이", "걸레년", "찐따", "틀딱", "한남충", "한녀충", "김치녀", "김치남",
    "맘충", "급식충", "애미충", "애비충", "엠창", "앰창", "패드립", "존나", "존니", "존내",
    "졸라", "ㅅㅂ", "ㅆㅂ", "ㅂㅅ", "ㅈㄹ", "ㅄ", "시부랄", "시부럴", "시부렬", "썅",
    "창녀", "또라이", "개돼지", "개쓰레기", "개소리", "니미", "니애미", "니애비", "느금마",
    "느개비", "십새", "좃나", "엿먹", "엿같", "개년", "개놈", "쓰레기새끼", "니엄마",
];

/// Spelling variants of the words above, matched against normalized text.
static BUILTIN_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        "시[ㅂ발팔바빨]",
        "씨[ㅂ발팔바빨]",
        "[개객갯]새[끼키기]",
        "병[시신쉰싄]",
        "[좆조좃]같",
        "미친[놈년넘련]",
        "[쌍썅상][놈년넘련]",
        "[씹십쉽][할세새]",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("valid builtin pattern"))
    .collect()
});

/// Moderation predicate applied to user text before anything is sent.
pub trait ContentFilter: Send + Sync {
    fn is_rejected(&self, text: &str) -> bool;
}

/// Rejects text containing any of a list of words. Matching ignores case and
/// whitespace, so spacing a word out does not get it past the filter.
#[derive(Debug, Clone, Default)]
pub struct WordListFilter {
    words: Vec<String>,
    builtin: bool,
}

impl WordListFilter {
    pub fn new<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let words = words
            .into_iter()
            .map(|w| normalize(w.as_ref()))
            .filter(|w| !w.is_empty())
            .collect();
        Self {
            words,
            builtin: false,
        }
    }

    /// The built-in list and spelling patterns, extended with `extra`.
    pub fn with_builtin<I, S>(extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut filter = Self::new(extra);
        filter
            .words
            .extend(BUILTIN_WORDS.iter().map(|word| normalize(word)));
        filter.builtin = true;
        filter
    }
}

impl ContentFilter for WordListFilter {
    fn is_rejected(&self, text: &str) -> bool {
        if self.words.is_empty() && !self.builtin {
            return false;
        }
        let text = normalize(&strip_tags(text));
        self.words.iter().any(|word| text.contains(word.as_str()))
            || (self.builtin && BUILTIN_PATTERNS.iter().any(|re| re.is_match(&text)))
    }
}

fn normalize(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

pub fn strip_tags(text: &str) -> String {
    HTML_TAG.replace_all(text, "").into_owned()
}

/// Visible length of a rich-text message: markup does not count.
pub fn text_len(message: &str) -> usize {
    strip_tags(message).chars().count()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub max_message_chars: usize,
    pub max_name_chars: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_message_chars: 10_000,
            max_name_chars: 50,
        }
    }
}

pub struct Validator<'a> {
    limits: Limits,
    filter: &'a dyn ContentFilter,
}

impl<'a> Validator<'a> {
    pub fn new(limits: Limits, filter: &'a dyn ContentFilter) -> Self {
        Self { limits, filter }
    }

    pub fn message(&self, message: &str) -> Result<(), ValidationError> {
        let len = text_len(message);
        if strip_tags(message).trim().is_empty() {
            return Err(ValidationError::EmptyMessage);
        }
        if len > self.limits.max_message_chars {
            return Err(ValidationError::MessageTooLong {
                len,
                max: self.limits.max_message_chars,
            });
        }
        if self.filter.is_rejected(message) {
            return Err(ValidationError::Rejected);
        }
        Ok(())
    }

    pub fn name(&self, name: Option<&str>) -> Result<(), ValidationError> {
        let Some(name) = name else {
            return Ok(());
        };
        let len = name.trim().chars().count();
        if len > self.limits.max_name_chars {
            return Err(ValidationError::NameTooLong {
                len,
                max: self.limits.max_name_chars,
            });
        }
        if self.filter.is_rejected(name) {
            return Err(ValidationError::Rejected);
        }
        Ok(())
    }

    pub fn contact(&self, contact: Option<&Contact>) -> Result<(), ValidationError> {
        match contact {
            None => Ok(()),
            Some(Contact::Email(email)) if EMAIL.is_match(email.trim()) => Ok(()),
            Some(Contact::Phone(phone))
                if phone.chars().filter(char::is_ascii_digit).count() >= 10 =>
            {
                Ok(())
            }
            Some(_) => Err(ValidationError::InvalidContact),
        }
    }

    pub fn comment(&self, draft: &NewComment) -> Result<(), ValidationError> {
        self.name(draft.author.as_deref())?;
        self.message(&draft.message)
    }

    pub fn post(&self, draft: &NewPost) -> Result<(), ValidationError> {
        self.name(draft.name.as_deref())?;
        self.contact(draft.contact.as_ref())?;
        self.message(&draft.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator(filter: &WordListFilter) -> Validator<'_> {
        Validator::new(
            Limits {
                max_message_chars: 10,
                max_name_chars: 5,
            },
            filter,
        )
    }

    #[test]
    fn markup_only_message_is_empty() {
        let filter = WordListFilter::default();
        let v = validator(&filter);
        assert_eq!(v.message("<p> </p>"), Err(ValidationError::EmptyMessage));
        assert_eq!(v.message(""), Err(ValidationError::EmptyMessage));
    }

    #[test]
    fn builtin_list_catches_spaced_and_variant_spellings() {
        let filter = WordListFilter::with_builtin(["darn"]);
        assert!(filter.is_rejected("시 발"));
        assert!(filter.is_rejected("<b>ㅅㅂ</b>"));
        assert!(filter.is_rejected("객새키 같으니"));
        assert!(filter.is_rejected("oh DARN it"));
        assert!(!filter.is_rejected("감사합니다, 좋은 하루 되세요"));
        assert!(!filter.is_rejected("Thank you for everything"));

        assert!(!WordListFilter::new(["darn"]).is_rejected("시발"));
        assert!(!WordListFilter::default().is_rejected("시발"));
    }

    #[test]
    fn length_ignores_tags() {
        let filter = WordListFilter::default();
        let v = validator(&filter);
        assert!(v.message("<b>0123456789</b>").is_ok());
        assert_eq!(
            v.message("01234567890"),
            Err(ValidationError::MessageTooLong { len: 11, max: 10 })
        );
    }

    #[test]
    fn filter_sees_through_spacing_and_case() {
        let filter = WordListFilter::new(["darn"]);
        assert!(filter.is_rejected("oh D a R n it"));
        assert!(filter.is_rejected("<i>da</i>rn"));
        assert!(!filter.is_rejected("darling"));
        let v = validator(&filter);
        assert_eq!(v.message("DARN"), Err(ValidationError::Rejected));
    }

    #[test]
    fn contact_rules() {
        let filter = WordListFilter::default();
        let v = validator(&filter);
        assert!(v.contact(Some(&Contact::Email("a@b.co".into()))).is_ok());
        assert!(v.contact(Some(&Contact::Phone("010-1234-5678".into()))).is_ok());
        assert_eq!(
            v.contact(Some(&Contact::Email("a@b".into()))),
            Err(ValidationError::InvalidContact)
        );
        assert_eq!(
            v.contact(Some(&Contact::Phone("12345".into()))),
            Err(ValidationError::InvalidContact)
        );
        assert!(v.contact(None).is_ok());
    }

    #[test]
    fn comment_checks_name_first() {
        let filter = WordListFilter::default();
        let v = validator(&filter);
        let draft = NewComment {
            author: Some("Too long name".into()),
            message: String::new(),
            parent_id: None,
        };
        assert!(matches!(
            v.comment(&draft),
            Err(ValidationError::NameTooLong { .. })
        ));
    }
}
