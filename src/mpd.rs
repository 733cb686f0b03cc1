// SPDX-License-Identifier: MIT

//! The MPD collaborator (§4.7, §6, expanded in SPEC_FULL §4.13): locates the
//! `<SegmentList>` whose parent `<BaseURL>` text begins with the video's
//! `*dash`-truncated basename, then exposes an ordered cursor of
//! `<SegmentURL>` handles with add-or-overwrite attributes and save.
//!
//! Implemented as a small owned tree over `quick-xml`'s pull parser/writer,
//! not a general DOM library: the only operations needed are the ones
//! `XmlHandler.cpp` performs (sibling walk, attribute get/set, save).

use crate::error::Error;
use crate::{bail, err};
use quick_xml::events::{BytesStart, BytesText, Event};
use quick_xml::reader::Reader;
use quick_xml::writer::Writer;
use std::path::{Path, PathBuf};

#[derive(Clone, Debug, Default)]
pub struct XmlNode {
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<XmlNode>,
    pub text: Option<String>,
}

impl XmlNode {
    fn local_name(&self) -> &str {
        match self.name.rsplit_once(':') {
            Some((_, local)) => local,
            None => &self.name,
        }
    }

    fn attr(&self, name: &str) -> Option<&str> {
        self.attrs.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str())
    }

    fn set_attr(&mut self, name: &str, value: String) -> bool {
        if let Some(existing) = self.attrs.iter_mut().find(|(k, _)| k == name) {
            existing.1 = value;
            true
        } else {
            self.attrs.push((name.to_string(), value));
            false
        }
    }
}

/// Returns the `*dash`-truncated prefix of a basename: everything up to and
/// including the last occurrence of the literal substring `dash`.
pub fn dash_prefix(basename: &str) -> Option<&str> {
    basename.rfind("dash").map(|i| &basename[..i + "dash".len()])
}

fn parse_tree(xml: &str) -> Result<XmlNode, Error> {
    let mut reader = Reader::from_str(xml);

    let mut stack: Vec<XmlNode> = vec![XmlNode {
        name: "#document".to_string(),
        ..Default::default()
    }];

    loop {
        match reader
            .read_event()
            .map_err(|e| err!(MalformedMpd, msg("xml parse error"), source(e)))?
        {
            Event::Start(e) => stack.push(node_from_start(&e)?),
            Event::Empty(e) => {
                let node = node_from_start(&e)?;
                stack.last_mut().unwrap().children.push(node);
            }
            Event::End(_) => {
                let node = stack.pop().unwrap();
                stack.last_mut().unwrap().children.push(node);
            }
            Event::Text(t) => {
                let text = decode_text(&t)?;
                if let Some(top) = stack.last_mut() {
                    if !text.trim().is_empty() {
                        top.text = Some(text);
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    let mut document = stack.pop().unwrap();
    if document.children.len() != 1 {
        bail!(MalformedMpd, msg("expected exactly one root element"));
    }
    Ok(document.children.remove(0))
}

fn node_from_start(e: &BytesStart) -> Result<XmlNode, Error> {
    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    let mut attrs = Vec::new();
    for a in e.attributes() {
        let a = a.map_err(|e| err!(MalformedMpd, msg("bad attribute"), source(e)))?;
        let key = String::from_utf8_lossy(a.key.as_ref()).into_owned();
        let value = a
            .unescape_value()
            .map_err(|e| err!(MalformedMpd, msg("bad attribute value"), source(e)))?
            .into_owned();
        attrs.push((key, value));
    }
    Ok(XmlNode {
        name,
        attrs,
        children: Vec::new(),
        text: None,
    })
}

fn decode_text(t: &BytesText) -> Result<String, Error> {
    t.unescape()
        .map_err(|e| err!(MalformedMpd, msg("bad text node"), source(e)).into())
        .map(|s| s.into_owned())
}

fn write_tree(node: &XmlNode) -> Result<String, Error> {
    let mut buf = Vec::new();
    let mut writer = Writer::new_with_indent(&mut buf, b' ', 2);
    writer
        .write_event(Event::Decl(quick_xml::events::BytesDecl::new("1.0", Some("UTF-8"), None)))
        .map_err(|e| err!(Io, msg("writing mpd declaration"), source(e)))?;
    write_node(&mut writer, node)?;
    String::from_utf8(buf).map_err(|e| err!(Io, msg("mpd output was not utf-8"), source(e)).into())
}

fn write_node(writer: &mut Writer<&mut Vec<u8>>, node: &XmlNode) -> Result<(), Error> {
    let mut start = BytesStart::new(node.name.as_str());
    for (k, v) in &node.attrs {
        start.push_attribute((k.as_str(), v.as_str()));
    }
    if node.children.is_empty() && node.text.is_none() {
        writer
            .write_event(Event::Empty(start))
            .map_err(|e| err!(Io, msg("writing mpd"), source(e)))?;
        return Ok(());
    }
    writer
        .write_event(Event::Start(start))
        .map_err(|e| err!(Io, msg("writing mpd"), source(e)))?;
    if let Some(text) = &node.text {
        writer
            .write_event(Event::Text(BytesText::new(text)))
            .map_err(|e| err!(Io, msg("writing mpd"), source(e)))?;
    }
    for child in &node.children {
        write_node(writer, child)?;
    }
    writer
        .write_event(Event::End(quick_xml::events::BytesEnd::new(node.name.as_str())))
        .map_err(|e| err!(Io, msg("writing mpd"), source(e)))?;
    Ok(())
}

/// An open MPD document plus a cursor over one `SegmentList`'s `SegmentURL` children.
pub struct Mpd {
    path: PathBuf,
    root: XmlNode,
    /// Path (child indices from the root) to the located `SegmentList` node.
    segment_list_path: Vec<usize>,
    /// Index of the current `SegmentURL` within the `SegmentList`'s children.
    cursor_index: usize,
}

fn get<'a>(root: &'a XmlNode, path: &[usize]) -> &'a XmlNode {
    let mut node = root;
    for &i in path {
        node = &node.children[i];
    }
    node
}

fn get_mut<'a>(root: &'a mut XmlNode, path: &[usize]) -> &'a mut XmlNode {
    let mut node = root;
    for &i in path {
        node = &mut node.children[i];
    }
    node
}

/// Finds the path to the first `BaseURL` node (at any depth) whose text
/// starts with `prefix`.
fn find_base_url(root: &XmlNode, prefix: &str) -> Option<Vec<usize>> {
    fn walk(node: &XmlNode, path: &mut Vec<usize>, prefix: &str) -> Option<Vec<usize>> {
        for (i, child) in node.children.iter().enumerate() {
            path.push(i);
            if child.local_name() == "BaseURL" {
                if let Some(text) = &child.text {
                    if text.starts_with(prefix) {
                        return Some(path.clone());
                    }
                }
            }
            if let Some(found) = walk(child, path, prefix) {
                return Some(found);
            }
            path.pop();
        }
        None
    }
    let mut path = Vec::new();
    walk(root, &mut path, prefix)
}

/// Scans `parent.children[start_idx..]` for the first node with local name `want`.
fn scan_siblings(parent: &XmlNode, start_idx: usize, want: &str) -> Option<usize> {
    parent.children[start_idx..]
        .iter()
        .position(|c| c.local_name() == want)
        .map(|rel| rel + start_idx)
}

impl Mpd {
    /// Loads `path`, locating the `SegmentList` whose sibling `BaseURL`'s
    /// text begins with `video_basename`'s `*dash`-truncated prefix, and
    /// positions the cursor at the first `SegmentURL`.
    pub fn open(path: &Path, video_basename: &str) -> Result<Mpd, Error> {
        let prefix = dash_prefix(video_basename).ok_or_else(|| {
            err!(
                MpdTargetNotFound,
                msg("no 'dash' substring in video basename {video_basename:?}; can't locate BaseURL")
            )
            .build()
        })?;

        let xml = std::fs::read_to_string(path)
            .map_err(|e| err!(Io, msg("unable to read {}", path.display()), source(e)))?;
        let root = parse_tree(&xml)?;

        let base_url_path = find_base_url(&root, prefix).ok_or_else(|| {
            err!(
                MpdTargetNotFound,
                msg("no BaseURL node with text matching prefix {prefix:?}")
            )
            .build()
        })?;

        let (base_parent_path, base_idx) = base_url_path.split_at(base_url_path.len() - 1);
        let base_idx = base_idx[0];
        let base_parent = get(&root, base_parent_path);
        let segment_list_idx = scan_siblings(base_parent, base_idx, "SegmentList").ok_or_else(|| {
            err!(MpdTargetNotFound, msg("no SegmentList sibling after matching BaseURL")).build()
        })?;
        let mut segment_list_path = base_parent_path.to_vec();
        segment_list_path.push(segment_list_idx);

        let segment_list = get(&root, &segment_list_path);
        if segment_list.children.is_empty() {
            bail!(MpdTargetNotFound, msg("SegmentList node has no children"));
        }
        let cursor_index = scan_siblings(segment_list, 0, "SegmentURL")
            .ok_or_else(|| err!(MpdTargetNotFound, msg("no SegmentURL node in SegmentList")).build())?;

        Ok(Mpd {
            path: path.to_path_buf(),
            root,
            segment_list_path,
            cursor_index,
        })
    }

    fn current(&self) -> &XmlNode {
        &get(&self.root, &self.segment_list_path).children[self.cursor_index]
    }

    fn current_mut(&mut self) -> &mut XmlNode {
        &mut get_mut(&mut self.root, &self.segment_list_path.clone()).children[self.cursor_index]
    }

    /// The current `SegmentURL`'s attribute value, if set.
    pub fn current_attr(&self, name: &str) -> Option<&str> {
        self.current().attr(name)
    }

    /// `(range_start, range_end)` from the current `SegmentURL`'s `mediaRange` attribute.
    pub fn current_range(&self) -> Result<(u64, u64), Error> {
        let raw = self.current().attr("mediaRange").ok_or_else(|| {
            err!(MalformedMpd, msg("SegmentURL has no mediaRange attribute")).build()
        })?;
        let (start, end) = raw.split_once('-').ok_or_else(|| {
            err!(MalformedMpd, msg("mediaRange {raw:?} is not of the form start-end")).build()
        })?;
        let start: u64 = start
            .parse()
            .map_err(|e| err!(MalformedMpd, msg("bad mediaRange start {start:?}"), source(e)))?;
        let end: u64 = end
            .parse()
            .map_err(|e| err!(MalformedMpd, msg("bad mediaRange end {end:?}"), source(e)))?;
        Ok((start, end))
    }

    /// Adds or overwrites an attribute on the current `SegmentURL`; logs a warning on overwrite.
    pub fn set_attribute(&mut self, name: &str, value: String) {
        let overwrote = self.current_mut().set_attr(name, value);
        if overwrote {
            tracing::warn!(attribute = name, "overwriting existing mpd attribute");
        }
    }

    /// Advances to the next `SegmentURL` sibling. Returns `false` at the end of the list.
    pub fn next_segment(&mut self) -> bool {
        let segment_list = get(&self.root, &self.segment_list_path);
        if self.cursor_index + 1 >= segment_list.children.len() {
            return false;
        }
        self.cursor_index += 1;
        true
    }

    /// Re-serializes the whole document back to its original path, UTF-8, pretty-printed.
    pub fn save(&self) -> Result<(), Error> {
        let xml = write_tree(&self.root)?;
        std::fs::write(&self.path, xml)
            .map_err(|e| err!(Io, msg("unable to write {}", self.path.display()), source(e)).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dash_prefix_takes_last_occurrence() {
        assert_eq!(dash_prefix("video-dash.mp4"), Some("video-dash"));
        assert_eq!(dash_prefix("dash-dash-video.mp4"), Some("dash-dash"));
        assert_eq!(dash_prefix("nomatch.mp4"), None);
    }

    const SAMPLE_MPD: &str = r#"<?xml version="1.0"?>
<MPD xmlns="urn:mpeg:dash:schema:mpd:2011">
  <Period>
    <AdaptationSet>
      <Representation>
        <BaseURL>video-dash.mp4</BaseURL>
        <SegmentList>
          <Initialization sourceURL="init.mp4"/>
          <SegmentURL mediaRange="100-499"/>
          <SegmentURL mediaRange="500-899"/>
        </SegmentList>
      </Representation>
    </AdaptationSet>
  </Period>
</MPD>
"#;

    #[test]
    fn locates_segment_list_and_walks_segment_urls() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.mpd");
        std::fs::write(&path, SAMPLE_MPD).unwrap();

        let mut mpd = Mpd::open(&path, "video-dash.mp4").unwrap();
        assert_eq!(mpd.current_range().unwrap(), (100, 499));
        mpd.set_attribute("iEnd", "199".to_string());
        assert!(mpd.next_segment());
        assert_eq!(mpd.current_range().unwrap(), (500, 899));
        assert!(!mpd.next_segment());
    }

    #[test]
    fn overwrite_logs_but_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.mpd");
        std::fs::write(&path, SAMPLE_MPD).unwrap();
        let mut mpd = Mpd::open(&path, "video-dash.mp4").unwrap();
        mpd.set_attribute("mediaRange", "0-1".to_string());
        assert_eq!(mpd.current_range().unwrap(), (0, 1));
    }

    #[test]
    fn missing_dash_substring_is_target_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.mpd");
        std::fs::write(&path, SAMPLE_MPD).unwrap();
        let err = Mpd::open(&path, "nomatch.mp4").unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::MpdTargetNotFound);
    }
}
