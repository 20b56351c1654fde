use super::lexer::Lexer;
use super::token::Token;
use crate::{
    Account, Amount, BalExpr, Currency, Date, Decimal, Error, ErrorLevel, ErrorType, Location,
    Meta, Source, SrcFile, TxnFlag,
};

use std::{
    collections::{HashMap, HashSet},
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

/// The type of `custom` directives holding balance expressions.
pub const CUSTOM_BALEXPR: &str = "balexpr";

#[derive(Debug)]
pub struct PostingDraft {
    pub account: Account,
    pub amount: Option<Amount>,
    pub src: Source,
}

#[derive(Debug)]
pub struct TxnDraft {
    pub date: Date,
    pub flag: TxnFlag,
    pub payee: String,
    pub narration: String,
    pub links: Vec<String>,
    pub tags: Vec<String>,
    pub meta: Meta,
    pub postings: Vec<PostingDraft>,
    pub src: Source,
}

#[derive(Debug, Default)]
pub struct AccountInfoDraft {
    pub open: Option<(Date, Source)>,
    pub close: Option<(Date, Source)>,
    pub currencies: HashSet<Currency>,
}

impl AccountInfoDraft {
    pub fn merge(&mut self, another: AccountInfoDraft, name: &str) -> Vec<Error> {
        let AccountInfoDraft {
            open,
            close,
            currencies,
        } = another;
        let mut errors = vec![];
        if let (Some((_, src)), Some((_, existing_src))) = (&open, &self.open) {
            errors.push(Error {
                level: ErrorLevel::Error,
                r#type: ErrorType::Duplicate,
                msg: format!("Account {} has been opened at {}.", name, existing_src),
                src: src.clone(),
            });
        }
        if let (Some((_, src)), Some((_, existing_src))) = (&close, &self.close) {
            errors.push(Error {
                level: ErrorLevel::Error,
                r#type: ErrorType::Duplicate,
                msg: format!("Account {} has been closed at {}.", name, existing_src),
                src: src.clone(),
            });
        }
        if errors.is_empty() {
            if open.is_some() {
                self.open = open;
                self.currencies = currencies;
            }
            if close.is_some() {
                self.close = close;
            }
        }
        errors
    }
}

/// Everything read from a ledger file and the files it includes, before any
/// verification.
#[derive(Debug, Default)]
pub struct LedgerDraft {
    pub accounts: HashMap<Account, AccountInfoDraft>,
    pub txns: Vec<TxnDraft>,
    pub checks: Vec<BalExpr>,
    pub options: HashMap<String, (String, Source)>,
    pub plugins: Vec<(String, Source)>,
}

impl LedgerDraft {
    pub fn add_option(&mut self, key: String, val: String, src: Source) -> Result<(), Error> {
        if let Some((_, existing_src)) = self.options.get(&key) {
            Err(Error {
                level: ErrorLevel::Warning,
                r#type: ErrorType::Duplicate,
                msg: format!(
                    "Ignored directive: option {} has been specified at {}.",
                    &key, existing_src
                ),
                src,
            })
        } else {
            self.options.insert(key, (val, src));
            Ok(())
        }
    }

    pub fn merge(&mut self, another: LedgerDraft) -> Vec<Error> {
        let mut errors = vec![];
        let LedgerDraft {
            accounts,
            txns,
            checks,
            options,
            plugins,
        } = another;
        self.txns.extend(txns);
        self.checks.extend(checks);
        self.plugins.extend(plugins);
        for (key, (val, src)) in options {
            if let Err(e) = self.add_option(key, val, src) {
                errors.push(e);
            }
        }
        for (name, info) in accounts {
            if let Some(existing_info) = self.accounts.get_mut(&name) {
                errors.extend(existing_info.merge(info, &name));
            } else {
                self.accounts.insert(name, info);
            }
        }
        errors
    }
}

pub struct Parser<'source> {
    lexer: Lexer<'source>,
    file: SrcFile,
    accounts: HashMap<&'source str, Account>,
    include_chain: Vec<String>,
}

impl<'source> Parser<'source> {
    fn src_from(&self, start: Location) -> Source {
        Source {
            start,
            end: self.lexer.last_token_end(),
            file: self.file.clone(),
        }
    }

    fn unexpected(&self, token: Token, text: &str) -> Result<(), Error> {
        Err(Error {
            level: ErrorLevel::Error,
            r#type: ErrorType::Syntax,
            msg: format!("Unexpected token {:?}({}).", token, text),
            src: Source {
                file: self.file.clone(),
                start: self.lexer.location(),
                end: self.lexer.location().advance(text.chars().count()),
            },
        })
    }

    fn parse_directives(&mut self, draft: &mut LedgerDraft, errors: &mut Vec<Error>) {
        while let Ok((token, text)) = self.lexer.peek() {
            let r = match token {
                Token::Include => self.parse_include(draft, errors),
                Token::Option => self.parse_option(draft),
                Token::Plugin => self.parse_plugin(draft),
                Token::Date => self.parse_dated_entry(draft),
                _ => self.unexpected(token, text),
            };
            if let Err(err) = r {
                errors.push(err);
                while let Ok((token, _)) = self.lexer.peek() {
                    match token {
                        Token::Option | Token::Include | Token::Plugin | Token::Date => break,
                        _ => self.lexer.consume(),
                    }
                }
            }
        }
    }

    fn parse_include(
        &mut self,
        draft: &mut LedgerDraft,
        errors: &mut Vec<Error>,
    ) -> Result<(), Error> {
        let start = self.lexer.location();
        self.lexer.take(Token::Include)?;
        let path_str = self.parse_string()?;
        let path = Path::new(path_str);
        let full_path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            let mut path_buf = PathBuf::from(self.file.as_str());
            path_buf.pop();
            path_buf.push(path);
            path_buf
        }
        .to_string_lossy()
        .into_owned();
        let src = self.src_from(start);
        if self.include_chain.contains(&full_path) {
            return Err(Error {
                msg: format!("Circular inclusion of {}.", full_path),
                src,
                r#type: ErrorType::Io,
                level: ErrorLevel::Error,
            });
        }
        log::debug!("including {}", full_path);
        let (sub_draft, sub_errors) =
            Self::parse_helper(full_path, src, self.include_chain.clone());
        errors.extend(sub_errors);
        errors.extend(draft.merge(sub_draft));
        Ok(())
    }

    fn parse_option(&mut self, draft: &mut LedgerDraft) -> Result<(), Error> {
        let start = self.lexer.location();
        self.lexer.take(Token::Option)?;
        let key = self.parse_string()?;
        let val = self.parse_string()?;
        let src = self.src_from(start);
        draft.add_option(key.to_string(), val.to_string(), src)
    }

    fn parse_plugin(&mut self, draft: &mut LedgerDraft) -> Result<(), Error> {
        let start = self.lexer.location();
        self.lexer.take(Token::Plugin)?;
        let name = self.parse_string()?;
        if let Ok((Token::String, _)) = self.lexer.peek() {
            self.lexer.consume();
        }
        log::debug!("ignored plugin {}", name);
        draft.plugins.push((name.to_string(), self.src_from(start)));
        Ok(())
    }

    fn parse_meta(&mut self) -> Result<Meta, Error> {
        let mut meta = Meta::new();
        while let Ok((Token::MetaLabel, key)) = self.lexer.peek() {
            let start = self.lexer.location();
            self.lexer.consume();
            let val = self.parse_string()?;
            let key = key.trim_end_matches(':');
            meta.insert(key.to_string(), (val.to_string(), self.src_from(start)));
        }
        Ok(meta)
    }

    fn parse_dated_entry(&mut self, draft: &mut LedgerDraft) -> Result<(), Error> {
        let start = self.lexer.location();
        let date_str = self.lexer.take(Token::Date)?;
        let date = date_str.parse::<Date>().map_err(|_| Error {
            msg: format!("Invalid date: {}.", date_str),
            src: Source {
                file: self.file.clone(),
                start,
                end: self.lexer.location(),
            },
            r#type: ErrorType::Syntax,
            level: ErrorLevel::Error,
        })?;
        let (token, text) = self.lexer.peek()?;
        match token {
            Token::Asterisk | Token::Exclamation | Token::Txn | Token::Balance | Token::Pad => {
                self.parse_txn(date, draft)
            }
            Token::Open => self.parse_open(date, draft),
            Token::Close => self.parse_close(date, draft),
            Token::Custom => self.parse_custom(date, start, draft),
            _ => self.unexpected(token, text),
        }
    }

    fn parse_account(&mut self) -> Result<Account, Error> {
        let account_str = self.lexer.take(Token::Account)?;
        let account = self
            .accounts
            .entry(account_str)
            .or_insert_with(|| Arc::new(account_str.to_string()))
            .clone();
        Ok(account)
    }

    fn parse_open(&mut self, date: Date, draft: &mut LedgerDraft) -> Result<(), Error> {
        let start = self.lexer.location();
        self.lexer.take(Token::Open)?;
        let account = self.parse_account()?;
        let currencies = self.parse_currency_set()?;
        let src = self.src_from(start);
        let another = AccountInfoDraft {
            open: Some((date, src)),
            close: None,
            currencies,
        };
        let info = draft.accounts.entry(account.clone()).or_default();
        match info.merge(another, &account).pop() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn parse_close(&mut self, date: Date, draft: &mut LedgerDraft) -> Result<(), Error> {
        let start = self.lexer.location();
        self.lexer.take(Token::Close)?;
        let account = self.parse_account()?;
        let src = self.src_from(start);
        let another = AccountInfoDraft {
            open: None,
            close: Some((date, src)),
            currencies: HashSet::new(),
        };
        let info = draft.accounts.entry(account.clone()).or_default();
        match info.merge(another, &account).pop() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn parse_currency_set(&mut self) -> Result<HashSet<Currency>, Error> {
        let mut set = HashSet::new();
        if let Ok((Token::Currency, currency)) = self.lexer.peek() {
            set.insert(currency.to_string());
            self.lexer.consume();
            while let Ok((Token::Comma, _)) = self.lexer.peek() {
                self.lexer.consume();
                let currency = self.lexer.take(Token::Currency)?;
                set.insert(currency.to_string());
            }
        }
        Ok(set)
    }

    fn parse_custom(
        &mut self,
        date: Date,
        start: Location,
        draft: &mut LedgerDraft,
    ) -> Result<(), Error> {
        self.lexer.take(Token::Custom)?;
        let custom_type = self.parse_string()?;
        if custom_type != CUSTOM_BALEXPR {
            while let Ok((token, _)) = self.lexer.peek() {
                match token {
                    Token::String | Token::Number | Token::Currency | Token::Account => {
                        self.lexer.consume()
                    }
                    _ => break,
                }
            }
            log::debug!("ignored custom directive {:?}", custom_type);
            return Ok(());
        }
        // Skips the opening quote.
        let expr_start = self.lexer.location().advance(1);
        let expr = self.parse_string()?;
        let expected = self.parse_amount()?;
        draft.checks.push(BalExpr {
            date,
            expr: expr.to_string(),
            expected,
            expr_start,
            src: self.src_from(start),
        });
        Ok(())
    }

    fn parse_txn(&mut self, date: Date, draft: &mut LedgerDraft) -> Result<(), Error> {
        let txn_start = self.lexer.location();
        let (token, text) = self.lexer.peek()?;
        let flag = match token {
            Token::Asterisk | Token::Txn => TxnFlag::Posted,
            Token::Exclamation => TxnFlag::Pending,
            Token::Balance => TxnFlag::Balance,
            Token::Pad => TxnFlag::Pad,
            _ => return self.unexpected(token, text),
        };
        self.lexer.consume();
        let (payee, narration) = {
            let (token1, text1) = self.lexer.peek()?;
            if token1 == Token::String {
                self.lexer.consume();
                let (token2, text2) = self.lexer.peek()?;
                if token2 == Token::String {
                    self.lexer.consume();
                    (
                        Self::remove_quotes(text1).to_string(),
                        Self::remove_quotes(text2).to_string(),
                    )
                } else {
                    (String::new(), Self::remove_quotes(text1).to_string())
                }
            } else {
                (String::new(), String::new())
            }
        };

        let mut links = Vec::new();
        let mut tags = Vec::new();
        while let Ok((token, text)) = self.lexer.peek() {
            match token {
                Token::Link => links.push(text.to_string()),
                Token::Tag => tags.push(text.to_string()),
                _ => break,
            };
            self.lexer.consume();
        }

        let meta = self.parse_meta()?;
        let postings = self.parse_postings()?;
        let src = self.src_from(txn_start);
        draft.txns.push(TxnDraft {
            date,
            flag,
            payee,
            narration,
            links,
            tags,
            meta,
            postings,
            src,
        });
        Ok(())
    }

    fn parse_postings(&mut self) -> Result<Vec<PostingDraft>, Error> {
        let mut postings = Vec::new();
        while let Ok((Token::Account, _)) = self.lexer.peek() {
            let start = self.lexer.location();
            let account = self.parse_account()?;
            let amount = if let Ok((Token::Number, _)) = self.lexer.peek() {
                Some(self.parse_amount()?)
            } else {
                None
            };
            let src = self.src_from(start);
            postings.push(PostingDraft {
                account,
                amount,
                src,
            });
        }
        Ok(postings)
    }

    #[inline]
    fn remove_quotes(input: &str) -> &str {
        let mut chars = input.chars();
        chars.next();
        chars.next_back();
        chars.as_str()
    }

    fn parse_string(&mut self) -> Result<&'source str, Error> {
        let quoted_str = self.lexer.take(Token::String)?;
        Ok(Self::remove_quotes(quoted_str))
    }

    fn parse_amount(&mut self) -> Result<Amount, Error> {
        let start = self.lexer.location();
        let num_str = self.lexer.take(Token::Number)?;
        let number = num_str.parse::<Decimal>().map_err(|e| Error {
            msg: e.to_string(),
            src: self.src_from(start),
            level: ErrorLevel::Error,
            r#type: ErrorType::Syntax,
        })?;
        let currency = self.lexer.take(Token::Currency)?;
        Ok(Amount {
            number,
            currency: currency.to_string(),
        })
    }

    /// Parses the ledger file at `path` and the files it includes.
    pub fn parse(path: &str) -> (LedgerDraft, Vec<Error>) {
        let src = Source {
            file: Arc::new(path.to_string()),
            start: Location { line: 1, col: 1 },
            end: Location { line: 1, col: 1 },
        };
        Self::parse_helper(path.to_string(), src, vec![])
    }

    /// Parses ledger `text` as if it were read from `file`.
    pub fn parse_text(text: &str, file: &str) -> (LedgerDraft, Vec<Error>) {
        Self::parse_source(text, file.to_string(), vec![])
    }

    fn parse_source(
        data: &str,
        path: String,
        mut include_chain: Vec<String>,
    ) -> (LedgerDraft, Vec<Error>) {
        let mut draft = LedgerDraft::default();
        include_chain.push(path.clone());
        let file = Arc::new(path);
        let mut parser = Parser {
            lexer: Lexer::new(data, file.clone()),
            file,
            accounts: HashMap::new(),
            include_chain,
        };
        let mut errors = Vec::new();
        parser.parse_directives(&mut draft, &mut errors);
        (draft, errors)
    }

    fn parse_helper(
        path: String,
        refer_src: Source,
        include_chain: Vec<String>,
    ) -> (LedgerDraft, Vec<Error>) {
        match fs::read_to_string(&path) {
            Ok(data) => Self::parse_source(&data, path, include_chain),
            Err(io_error) => {
                let error = Error {
                    r#type: ErrorType::Io,
                    level: ErrorLevel::Error,
                    msg: format!("Couldn't read {}: {:?}", &path, io_error),
                    src: refer_src,
                };
                (LedgerDraft::default(), vec![error])
            }
        }
    }
}
