use std::collections::HashMap;

use derive_more::Display;
use unicode_xid::UnicodeXID;
use nom::{
	IResult,
	branch::alt,
	bytes::complete::{tag, take_until},
	character::complete::{anychar, i32, multispace1, newline, not_line_ending},
	combinator::{all_consuming, map, opt, value, verify},
	error::{VerboseError, context, convert_error},
	multi::many0,
	sequence::{delimited, pair, preceded, terminated, tuple},
};

use crate::{ChannelSwizzle, ChannelSwizzleId, PaaError::*, PaaResult};
use crate::texconfig::{TexConvertConfig, TexFormat, TextureErrorMetrics, TextureHint, TextureMipmapFilter};


fn parse_single_line_comment(i: &str) -> IResult<&str, (), VerboseError<&str>> {
	value((), pair(tag("//"), context("single line comment", tuple((not_line_ending, opt(newline))))))(i)
}


fn parse_multi_line_comment(i: &str) -> IResult<&str, (), VerboseError<&str>> {
	value((), tuple((tag("/*"), context("multi-line comment", take_until("*/")), tag("*/"))))(i)
}


#[test]
fn comments() {
	assert_eq!(parse_single_line_comment("// Good"), Ok(("", ())));
	assert_eq!(parse_single_line_comment("// comment\nnot a comment\n"), Ok(("not a comment\n", ())));
	assert_eq!(parse_multi_line_comment("/* Good /* \n //*/not a comment"), Ok(("not a comment", ())));
	assert!(parse_single_line_comment("/ Bad").is_err());
	assert!(parse_multi_line_comment("/* Bad").is_err());
	assert!(parse_multi_line_comment("Bad */").is_err());
}


fn construct_ident(args: (char, Vec<char>)) -> ConfigIdent {
	let (start, cont) = args;
	let mut inner = String::new();
	inner.push(start);
	inner.extend(cont);
	ConfigIdent::from(&inner)
}


fn parse_ident(i: &str) -> IResult<&str, ConfigIdent, VerboseError<&str>> {
	map(
		pair(
			verify(anychar, |c: &char| UnicodeXID::is_xid_start(*c)),
			many0(verify(anychar, |c: &char| UnicodeXID::is_xid_continue(*c)))),
	construct_ident)(i)
}


fn parse_value(i: &str) -> IResult<&str, ConfigValue, VerboseError<&str>> {
	alt((
		map(i32, ConfigValue::Integer),
		map(delimited(tag("\""), take_until("\""), tag("\"")), |s: &str| ConfigValue::String(String::from(s))),
		map(parse_ident, ConfigValue::Ident),
	))(i)
}


fn parse_property(i: &str) -> IResult<&str, ConfigProperty, VerboseError<&str>> {
	tuple((
			parse_ident,
			context("equals sign", with_ws_or_comments(tag("="))),
			context("property value", with_ws_or_comments(parse_value)),))
		(i)
		.map(|args: (&str, (ConfigIdent, &str, ConfigValue))| {
			let (left, (ident, _, value)) = args;
			(left, ConfigProperty { ident, value })
		})
}


fn parse_class(i: &str) -> IResult<&str, ConfigClass, VerboseError<&str>> {
	let class_name = context("class name", with_ws_or_comments(parse_ident));
	let parent_class_name = context("parent class name", opt(preceded(with_ws_or_comments(tag(":")), with_ws_or_comments(parse_ident))));
	let children = context("children", terminated_list(parse_item, ";"));

	#[allow(clippy::type_complexity)]
	tuple((
		context("class tag", tag("class")),
		class_name,
		parent_class_name,
		context("opening brace", with_ws_or_comments(tag("{"))),
		children,
		context("closing brace", tag("}")),))
	(i)
	.map(|args: (&str, (&str, ConfigIdent, Option<ConfigIdent>, &str, Vec<ConfigItem>, &str))| {
		let (left, (_, classname, inherit_classname, _, children, _)) = args;
		(left, ConfigClass { classname, inherit_classname, children })
	})
}


fn parse_item(i: &str) -> IResult<&str, ConfigItem, VerboseError<&str>> {
	alt((
		map(parse_property, ConfigItem::Property),
		map(parse_class, ConfigItem::Class)
	))(i)
}


#[test]
fn property() {
	assert_eq!(parse_ident("dynRange").unwrap(), ("", ConfigIdent::from("dynRange")));
	assert_eq!(parse_value("\"Hello\"").unwrap(), ("", ConfigValue::String(String::from("Hello"))));
	assert_eq!(parse_value("-20").unwrap(), ("", ConfigValue::Integer(-20)));
	assert_eq!(parse_property("dynRange = /* comment */1").unwrap(), ("", (ConfigProperty { ident: ConfigIdent::from("dynRange"), value: ConfigValue::Integer(1) })));
}


fn wscom0(i: &str) -> IResult<&str, (), VerboseError<&str>> {
	value((), many0(alt((parse_single_line_comment, parse_multi_line_comment, value((), multispace1)))))(i)
}


fn with_ws_or_comments<'a, F: 'a, O>(inner: F) -> impl FnMut(&'a str) -> IResult<&'a str, O, VerboseError<&'a str>>
where
	F: FnMut(&'a str) -> IResult<&'a str, O, VerboseError<&'a str>>,
{
	delimited(wscom0, inner, wscom0)
}


#[test]
fn with_whitespace() {
	assert_eq!(with_ws_or_comments(parse_ident)(" /* comment */ ident // another comment").unwrap(), ("", ConfigIdent::from("ident")));
}


fn terminated_list<'a, F: 'a, O>(inner: F, delimiter: &'static str) -> impl FnMut(&'a str) -> IResult<&'a str, Vec<O>, VerboseError<&'a str>>
where
	F: FnMut(&'a str) -> IResult<&'a str, O, VerboseError<&'a str>>,
{
	many0(terminated(with_ws_or_comments(inner), with_ws_or_comments(tag(delimiter))))
}


#[derive(Debug, Display, PartialEq, Eq, Hash, Clone)]
struct ConfigIdent {
	inner: String,
}


impl PartialEq<&str> for ConfigIdent {
	fn eq(&self, other: &&str) -> bool {
		self.inner.to_uppercase() == other.to_uppercase()
	}
}


impl ConfigIdent {
	fn from(inner: &str) -> Self {
		let inner = String::from(inner);
		Self { inner }
	}
}


#[derive(Debug, PartialEq, Eq, Clone)]
enum ConfigItem {
	Property(ConfigProperty),
	Class(ConfigClass),
}


#[derive(Debug, PartialEq, Eq, Clone)]
struct ConfigClass {
	classname: ConfigIdent,
	inherit_classname: Option<ConfigIdent>,
	children: Vec<ConfigItem>,
}


impl ConfigClass {
	fn prop(&self, ident: &str) -> Option<&ConfigProperty> {
		self.children.iter().find_map(|i| match i {
			ConfigItem::Property(p) if p.ident == ident => Some(p),
			_ => None,
		})
	}


	/// Build a [`TextureHint`] from this class, starting from the already
	/// built parent hint when the class inherits one.
	fn into_hint(self, siblings: &HashMap<String, TextureHint>) -> PaaResult<TextureHint> {
		let mut hint = if let Some(parent) = &self.inherit_classname {
			siblings.get(&parent.inner.to_uppercase())
				.cloned()
				.ok_or_else(|| TexconvertInvalidInherit(parent.inner.clone()))?
		}
		else {
			TextureHint::default()
		};

		hint.class_name = self.classname.inner.clone();
		hint.extends = self.inherit_classname.as_ref().map(|c| c.inner.clone());

		if let Some(pattern) = self.prop("name").and_then(ConfigProperty::as_text) {
			hint.pattern = pattern;
		};

		if let Some(text) = self.prop("format").and_then(ConfigProperty::as_text) {
			hint.format = text.parse::<TexFormat>()
				.map_err(|()| TexconvertParse(format!("unknown format {:?} in {}", text, self.classname)))?;
		};

		if let Some(text) = self.prop("mipmapFilter").and_then(ConfigProperty::as_text) {
			hint.mipmap_filter = text.parse::<TextureMipmapFilter>()
				.map_err(|()| TexconvertParse(format!("unknown mipmapFilter {:?} in {}", text, self.classname)))?;
		};

		if let Some(text) = self.prop("errorMetrics").and_then(ConfigProperty::as_text) {
			hint.error_metrics = text.parse::<TextureErrorMetrics>()
				.map_err(|()| TexconvertParse(format!("unknown errorMetrics {:?} in {}", text, self.classname)))?;
		};

		if let Some(b) = self.prop("enableDXT").and_then(ConfigProperty::as_bool) {
			hint.enable_dxt = Some(b);
		};

		if let Some(b) = self.prop("dynRange").and_then(ConfigProperty::as_bool) {
			hint.dyn_range = Some(b);
		};

		if let Some(b) = self.prop("autoreduce").and_then(ConfigProperty::as_bool) {
			hint.auto_reduce = Some(b);
		};

		if let Some(b) = self.prop("virtualSwizzle").and_then(ConfigProperty::as_bool) {
			hint.virtual_swz = Some(b);
		};

		if let Some(b) = self.prop("dithering").and_then(ConfigProperty::as_bool) {
			hint.dithering = Some(b);
		};

		if let Some(limit) = self.prop("limitSize").and_then(ConfigProperty::as_int) {
			hint.limit_size = u32::try_from(limit).unwrap_or(0);
		};

		let channels = [
			("channelSwizzleA", ChannelSwizzleId::Alpha),
			("channelSwizzleR", ChannelSwizzleId::Red),
			("channelSwizzleG", ChannelSwizzleId::Green),
			("channelSwizzleB", ChannelSwizzleId::Blue),
		];

		for (prop_name, target) in channels {
			if let Some(text) = self.prop(prop_name).and_then(ConfigProperty::as_text) {
				let channel = ChannelSwizzle::parse_data_with_target(&text, target)?;

				match target {
					ChannelSwizzleId::Alpha => hint.swizzle.a = channel,
					ChannelSwizzleId::Red => hint.swizzle.r = channel,
					ChannelSwizzleId::Green => hint.swizzle.g = channel,
					ChannelSwizzleId::Blue => hint.swizzle.b = channel,
				};
			};
		};

		Ok(hint)
	}
}


#[derive(Debug, Display, PartialEq, Eq, Clone)]
#[display(fmt = "{} = {};", ident, value)]
struct ConfigProperty {
	ident: ConfigIdent,
	value: ConfigValue,
}


impl ConfigProperty {
	fn as_text(&self) -> Option<String> {
		match &self.value {
			ConfigValue::String(s) => Some(s.clone()),
			ConfigValue::Ident(i) => Some(i.inner.clone()),
			ConfigValue::Integer(_) => None,
		}
	}


	fn as_bool(&self) -> Option<bool> {
		match &self.value {
			ConfigValue::Integer(i) => Some(*i != 0),
			ConfigValue::Ident(i) if i == &"true" => Some(true),
			ConfigValue::Ident(i) if i == &"false" => Some(false),
			_ => None,
		}
	}


	fn as_int(&self) -> Option<i32> {
		match &self.value {
			ConfigValue::Integer(i) => Some(*i),
			_ => None,
		}
	}
}


#[derive(Debug, Display, PartialEq, Eq, Clone)]
enum ConfigValue {
	#[display(fmt = "{}", _0)]
	Integer(i32),
	#[display(fmt = "\"{}\"", _0)]
	String(String),
	#[display(fmt = "{}", _0)]
	Ident(ConfigIdent),
}


/// Parse the original `TexConvert.cfg` class syntax into a
/// [`TexConvertConfig`].  Hints come from the children of the
/// `class TextureHints` block, in order, with parent-class inheritance
/// resolved; the top-level `convertVersion` assignment is carried over.
pub(crate) fn try_parse_texconvert(input: &str) -> PaaResult<TexConvertConfig> {
	let (_, items) = all_consuming(terminated_list(parse_item, ";"))(input)
		.map_err(|e| TexconvertParse(match e {
			nom::Err::Error(e) | nom::Err::Failure(e) => convert_error(input, e),
			nom::Err::Incomplete(_) => String::from("incomplete input"),
		}))?;

	let mut config = TexConvertConfig::default();
	let mut hints_class: Option<ConfigClass> = None;

	for item in items {
		match item {
			ConfigItem::Class(c) if c.classname == "TextureHints" => {
				hints_class = Some(c);
			},

			ConfigItem::Property(p) if p.ident == "convertVersion" => {
				if let Some(version) = p.as_int() {
					config.convert_version = u32::try_from(version).unwrap_or(0);
				};
			},

			_ => (),
		};
	};

	let hints_class = match hints_class {
		Some(c) => c,
		None => return Ok(config),
	};

	let mut by_classname: HashMap<String, TextureHint> = HashMap::new();

	for child in hints_class.children {
		if let ConfigItem::Class(c) = child {
			let classname = c.classname.inner.to_uppercase();
			let hint = c.into_hint(&by_classname)?;
			let _ = by_classname.insert(classname, hint.clone());
			config.hints.push(hint);
		};
	};

	Ok(config)
}


#[cfg(test)]
mod tests {
	use super::*;

	const SAMPLE: &str = r#"
convertVersion = 6;

class TextureHints {
	// Plain color maps.
	class ColorMap {
		name = "*_co.*";
		format = "DXT1";
		dynRange = 1;
	};

	/* Draft variant inherits ColorMap. */
	class ColorMapDraft : ColorMap {
		name = "*_dco.*";
		errorMetrics = Distance;
		channelSwizzleA = "1-G";
		limitSize = 512;
		autoreduce = 1;
	};
};
"#;


	#[test]
	fn parses_hints_with_inheritance() {
		let cfg = TexConvertConfig::parse(SAMPLE).unwrap();
		assert_eq!(cfg.convert_version, 6);
		assert_eq!(cfg.hints.len(), 2);

		let base = &cfg.hints[0];
		assert_eq!(base.class_name, "ColorMap");
		assert_eq!(base.pattern, "*_co.*");
		assert_eq!(base.format, TexFormat::Dxt1);
		assert_eq!(base.dyn_range, Some(true));
		assert!(base.swizzle.is_noop());

		let draft = &cfg.hints[1];
		assert_eq!(draft.class_name, "ColorMapDraft");
		assert_eq!(draft.extends.as_deref(), Some("ColorMap"));
		assert_eq!(draft.pattern, "*_dco.*");
		assert_eq!(draft.format, TexFormat::Dxt1);
		assert_eq!(draft.dyn_range, Some(true));
		assert_eq!(draft.error_metrics, TextureErrorMetrics::Distance);
		assert_eq!(draft.limit_size, 512);
		assert_eq!(draft.auto_reduce, Some(true));
		assert!(!draft.swizzle.is_noop());
		assert_eq!(draft.swizzle.tag_bytes()[0], 0x06);

		assert_eq!(cfg.resolve("town_dco.paa").unwrap().class_name, "ColorMapDraft");
	}


	#[test]
	fn unknown_parent_is_rejected() {
		let input = "class TextureHints { class A : Missing { name = \"*_a.*\"; }; };";
		assert!(matches!(TexConvertConfig::parse(input), Err(TexconvertInvalidInherit(_))));
	}


	#[test]
	fn garbage_is_rejected() {
		assert!(matches!(TexConvertConfig::parse("class {"), Err(TexconvertParse(_))));
	}


	#[test]
	fn empty_input_is_empty_config() {
		let cfg = TexConvertConfig::parse("").unwrap();
		assert!(cfg.hints.is_empty());
	}
}
