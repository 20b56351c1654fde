use logos::Logos;

#[derive(Debug, PartialEq, Logos, Clone, Copy)]
pub enum Token {
    #[regex(r"[ \f\r\t\v]+")]
    WhiteSpace,

    #[token("include")]
    Include,

    #[token("option")]
    Option,

    #[token("plugin")]
    Plugin,

    #[token("open")]
    Open,

    #[token("close")]
    Close,

    #[token("balance")]
    Balance,

    #[token("pad")]
    Pad,

    #[token("custom")]
    Custom,

    #[token("txn")]
    Txn,

    #[token("*")]
    Asterisk,

    #[token("!")]
    Exclamation,

    #[regex(r";[^\n]*")]
    Comment,

    #[token(",")]
    Comma,

    #[token("\n")]
    NewLine,

    #[regex(r#""[^"]*""#)]
    String,

    #[regex(r"#\S+")]
    Tag,

    #[regex(r"\^\S+")]
    Link,

    #[regex(r"\d\d\d\d-\d\d-\d\d")]
    Date,

    #[regex(r#"[^a-z,#\^":;{}\s\d\-\+\.][^,#\^":;{}\s]*(:[^,#\^":;{}\s]+)+"#)]
    Account,

    #[regex(r#"[^A-Z,#\^":;{}\s\d\-\+\.][^,#\^":;{}\s]*:"#)]
    MetaLabel,

    #[regex(r#"[^a-z,#\^":;{}\s\d\-\+\.][^,#\^":;{}\s]*"#)]
    Currency,

    #[regex(r"[\-\+]?\d+(\.\d*)?")]
    #[regex(r"[\-\+]?\.\d+")]
    Number,

    #[error]
    Error,
}
