//! Korean particle and ending stripping for the keyword analyzer.
//!
//! Korean attaches case particles and verb endings directly to the stem
//! ("개인정보를", "처리합니다"), so a whitespace tokenizer would keep them in the
//! term and "개인정보" would never match. The filter cuts the longest known
//! suffix from Hangul tokens, leaving at least two syllables of stem.

use tantivy::tokenizer::{Token, TokenFilter, TokenStream, Tokenizer};

const MIN_STEM_CHARS: usize = 2;

// Longest first within each length so the first match is the longest.
const SUFFIXES: &[&str] = &[
	"합니다", "됩니다", "에서는", "으로는", "에게서", "이라는", "으로서", "으로써",
	"에서", "에게", "으로", "부터", "까지", "이나", "에는", "에도", "로서", "로써", "라는", "처럼", "보다",
	"마다", "조차", "한다", "하는", "하고", "된다", "되는", "와의", "과의",
	"은", "는", "이", "가", "을", "를", "의", "에", "와", "과", "도", "로", "만",
];

fn is_hangul(c: char) -> bool {
	('\u{AC00}'..='\u{D7A3}').contains(&c)
}

/// Returns the byte length of `word` once its particle or ending is removed.
pub fn stem_len(word: &str) -> usize {
	if !word.chars().last().is_some_and(is_hangul) {
		return word.len();
	}
	let chars = word.chars().count();
	for suffix in SUFFIXES {
		if let Some(stem) = word.strip_suffix(suffix) {
			if chars - suffix.chars().count() >= MIN_STEM_CHARS {
				return stem.len();
			}
		}
	}
	word.len()
}

#[derive(Clone, Default)]
pub struct KoreanParticleFilter;

impl TokenFilter for KoreanParticleFilter {
	type Tokenizer<T: Tokenizer> = KoreanParticleWrapper<T>;

	fn transform<T: Tokenizer>(self, tokenizer: T) -> KoreanParticleWrapper<T> {
		KoreanParticleWrapper { inner: tokenizer }
	}
}

#[derive(Clone)]
pub struct KoreanParticleWrapper<T> {
	inner: T,
}

impl<T: Tokenizer> Tokenizer for KoreanParticleWrapper<T> {
	type TokenStream<'a> = KoreanParticleStream<T::TokenStream<'a>>;

	fn token_stream<'a>(&'a mut self, text: &'a str) -> Self::TokenStream<'a> {
		KoreanParticleStream { tail: self.inner.token_stream(text) }
	}
}

pub struct KoreanParticleStream<T> {
	tail: T,
}

impl<T: TokenStream> TokenStream for KoreanParticleStream<T> {
	fn advance(&mut self) -> bool {
		if !self.tail.advance() {
			return false;
		}
		let token = self.tail.token_mut();
		let keep = stem_len(&token.text);
		token.text.truncate(keep);
		true
	}

	fn token(&self) -> &Token {
		self.tail.token()
	}

	fn token_mut(&mut self) -> &mut Token {
		self.tail.token_mut()
	}
}
