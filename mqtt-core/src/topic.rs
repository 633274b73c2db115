use bytes::Bytes;

use crate::{
    err::{DecodeError, DecodeErrorKind},
    io::decode_utf8,
    qos::QosLevel,
};

#[derive(PartialEq, Eq, PartialOrd, Ord, Clone, Debug)]
pub struct TopicFilter(Vec<TopicToken>);

impl TopicFilter {
    pub fn decode(bytes: &mut Bytes) -> Result<Self, DecodeError> {
        let string = decode_utf8(bytes)?;
        let tokens = Self::from_str(string.as_str())?;
        return Ok(tokens);
    }

    pub fn from_str(str: &'_ str) -> Result<Self, DecodeError> {
        if str.len() == 0 {
            return Err(DecodeError::new(
                DecodeErrorKind::MalformedTopicFilter,
                format!("Invalid topic filter, filter contains no bytes."),
            ));
        }

        let mut tokens = Vec::new();
        let mut strs = str.split('/').peekable();

        loop {
            if let Some(str) = strs.next() {
                let token = TopicToken::from_str(str);

                if let TopicToken::MultiLevel = token {
                    if strs.peek().is_some() {
                        return Err(DecodeError::new(
                            DecodeErrorKind::MalformedTopicFilter,
                            format!("Invalid topic filter: {str}"),
                        ));
                    }
                }
                tokens.push(token);
            } else {
                break;
            }
        }

        return Ok(Self(tokens));
    }

    pub fn to_string(self) -> String {
        let mut string = String::new();
        for (i, token) in self.into_iter().enumerate() {
            if i > 0 {
                string.push('/');
            }
            string += token.as_str();
        }
        return string;
    }

    pub fn len(&self) -> usize {
        let mut len = 0;
        for (i, token) in self.0.iter().enumerate() {
            if i > 0 {
                len += 1;
            }
            match token {
                TopicToken::String(string) => len += string.len(),
                _ => len += 1,
            }
        }

        return len;
    }
}

#[derive(PartialEq, PartialOrd, Eq, Ord, Clone, Debug, Hash)]
pub struct TopicName(Vec<TopicToken>);

impl TopicName {
    pub fn decode(bytes: &mut Bytes) -> Result<(Self, &mut Bytes), DecodeError> {
        let string = decode_utf8(bytes)?;
        let tokens = Self::from_str(string.as_str())?;
        return Ok((tokens, bytes));
    }

    pub fn from_str(str: &'_ str) -> Result<Self, DecodeError> {
        if str.len() == 0 {
            return Err(DecodeError::new(
                DecodeErrorKind::MalformedTopicName,
                format!("Invalid topic name: {str}"),
            ));
        }

        let mut tokens = Vec::new();
        let mut strs = str.split('/');

        loop {
            if let Some(str) = strs.next() {
                let token = TopicToken::from_str(str);
                match token {
                    TopicToken::String(_) | TopicToken::Dollar(_) => {
                        tokens.push(token);
                    }
                    _ => {
                        return Err(DecodeError::new(
                            DecodeErrorKind::MalformedTopicName,
                            format!("Invalid topic name: {str}"),
                        ))
                    }
                }
            } else {
                break;
            }
        }

        return Ok(Self(tokens));
    }

    pub fn to_string(self) -> String {
        let mut string = String::new();
        for token in self.into_iter() {
            string += token.as_str();
            string.push('/');
        }
        string.pop();
        return string;
    }

    pub fn len(&self) -> usize {
        let mut len = 0;
        for token in &self.0 {
            match token {
                TopicToken::String(string) => len += string.len() + 1,
                _ => len += 2,
            }
        }

        return len - 1;
    }
}

impl IntoIterator for TopicName {
    type Item = TopicToken;
    type IntoIter = std::vec::IntoIter<TopicToken>;
    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl PartialEq<TopicFilter> for TopicName {
    fn eq(&self, filter: &TopicFilter) -> bool {
        let mut name_iter = self.0.iter();
        let mut filter_iter = filter.0.iter().peekable();

        loop {
            match (name_iter.next(), filter_iter.next()) {
                (Some(name_token), Some(filter_token)) => {
                    if name_token != filter_token {
                        return false;
                    }

                    if let Some(next_filter) = filter_iter.peek() {
                        if let TopicToken::MultiLevel = next_filter {
                            // a multi-level wildcard must not swallow a $-prefixed topic.
                            loop {
                                if let Some(name_token) = name_iter.next() {
                                    if let TopicToken::Dollar(_) = name_token {
                                        return false;
                                    }
                                } else {
                                    return true;
                                }
                            }
                        }
                    }
                }
                (None, None) => return true,
                _ => return false,
            }
        }
    }
}

impl PartialEq<TopicName> for TopicFilter {
    fn eq(&self, topic: &TopicName) -> bool {
        topic == self
    }
}

impl IntoIterator for TopicFilter {
    type Item = TopicToken;
    type IntoIter = std::vec::IntoIter<TopicToken>;
    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

#[derive(PartialOrd, Eq, Ord, Clone, Debug, Hash)]
pub enum TopicToken {
    Dollar(String),
    MultiLevel,
    SingleLevel,
    String(String),
}

impl PartialEq for TopicToken {
    fn eq(&self, other: &Self) -> bool {
        match self {
            TopicToken::Dollar(string) => match other {
                TopicToken::Dollar(o_string) => o_string == string,
                _ => false,
            },

            TopicToken::MultiLevel | TopicToken::SingleLevel => !matches!(other, TopicToken::Dollar(_)),

            TopicToken::String(string) => match other {
                TopicToken::MultiLevel | TopicToken::SingleLevel => true,
                TopicToken::String(o_string) => string == o_string,
                _ => false,
            },
        }
    }
}

impl TopicToken {
    fn as_str<'a>(&'a self) -> &'a str {
        match self {
            Self::Dollar(string) => return string.as_str(),
            Self::MultiLevel => return "#",
            Self::SingleLevel => return "+",
            Self::String(string) => return string.as_str(),
        }
    }

    fn from_str(string: &'_ str) -> Self {
        if string.starts_with('$') {
            return Self::Dollar(String::from(string));
        }
        match string {
            "#" => return Self::MultiLevel,
            "+" => return Self::SingleLevel,
            _ => return Self::String(String::from(string)),
        }
    }
}

/// A single (filter, requested QoS) pair as carried in a SUBSCRIBE payload,
/// and as stored per registered handler once granted.
#[derive(PartialEq, Eq, PartialOrd, Ord, Clone, Debug)]
pub struct TopicSubscription {
    filter: TopicFilter,
    qos: QosLevel,
}

impl TopicSubscription {
    pub fn new(filter: TopicFilter, qos: QosLevel) -> Self {
        return Self { filter, qos };
    }

    pub fn filter(&self) -> &TopicFilter {
        return &self.filter;
    }

    pub fn qos(&self) -> QosLevel {
        return self.qos;
    }
}

/// A SUBSCRIBE payload entry: a filter that parsed cleanly, or one the peer sent
/// malformed. Malformed entries cannot be re-encoded; they only ever arise on decode.
#[derive(PartialEq, Eq, PartialOrd, Ord, Clone, Debug)]
pub enum TopicFilterResult {
    Ok(TopicSubscription),
    Err,
}
