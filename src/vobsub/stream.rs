//! The top-level `VobSub` stream: pairs a `.idx` sidecar with its
//! companion `.sub` file and drives [`super::reader::SubpictureReader`]
//! over every caption it describes.
//!
//! `Subtitles::next` drives [`super::SubpictureReader`], which
//! reassembles control headers that straddle packet boundaries rather
//! than assuming a single-pass PES scan sees the whole control buffer
//! in one pack.

use std::path::{Path, PathBuf};

use crate::errors::VobSubError;
use crate::vobsub::byte_buffer::ByteBuffer;
use crate::vobsub::idx::IdxParser;
use crate::vobsub::reader::SubpictureReader;
use crate::vobsub::subpicture::{IdxHeader, SubPicture};

/// A `.idx`/`.sub` pair: the parsed header plus the seed subpictures
/// for whichever language `langidx:` selected.
///
/// Streams are single-producer/single-consumer: `Index` itself is
/// cheap to hold onto, but each call to [`Index::subtitles`] opens its
/// own [`ByteBuffer`] over the companion `.sub` file, so concurrent
/// iterations never share file-handle state.
#[derive(Debug)]
pub struct Index {
    header: IdxHeader,
    seeds: Vec<SubPicture>,
    sub_path: PathBuf,
    fix_zero_alpha: bool,
}

impl Index {
    /// Open `path` (a `.idx` file) and locate its companion `.sub` file
    /// by replacing the extension. The `.sub` file itself isn't opened
    /// until [`Index::subtitles`] is called.
    ///
    /// Zero-alpha captions reuse the previous caption's alpha by
    /// default (the `fix_zero_alpha` setting); use
    /// [`Index::with_fix_zero_alpha`] to turn that off.
    ///
    /// # Errors
    /// Returns [`VobSubError::Idx`] if the `.idx` file is malformed or
    /// unreadable.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, VobSubError> {
        let path = path.as_ref();
        let (header, seeds) = IdxParser::parse(path)?;
        let mut sub_path = path.to_owned();
        sub_path.set_extension("sub");
        Ok(Self {
            header,
            seeds,
            sub_path,
            fix_zero_alpha: true,
        })
    }

    /// Override the zero-alpha fallback behavior (default: enabled).
    #[must_use]
    pub const fn with_fix_zero_alpha(mut self, enabled: bool) -> Self {
        self.fix_zero_alpha = enabled;
        self
    }

    /// The parsed `.idx` header: screen size, origin, palette, active
    /// language.
    #[must_use]
    pub const fn header(&self) -> &IdxHeader {
        &self.header
    }

    /// The 16-entry master RGB palette from the `.idx` header.
    #[must_use]
    pub const fn palette(&self) -> &[(u8, u8, u8); 16] {
        &self.header.palette
    }

    /// Number of captions described by the `.idx` file, before any of
    /// them have been read.
    #[must_use]
    pub fn len(&self) -> usize {
        self.seeds.len()
    }

    /// Is there no caption at all for the active language?
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.seeds.is_empty()
    }

    /// Open the companion `.sub` file and return an iterator that reads
    /// every caption in order.
    ///
    /// # Errors
    /// Returns [`VobSubError::Buffer`] if the `.sub` file can't be
    /// opened.
    pub fn subtitles(&self) -> Result<Subtitles<'_>, VobSubError> {
        let buf = ByteBuffer::open(&self.sub_path)?;
        let reader = SubpictureReader::new(
            self.header.active_stream_id,
            self.fix_zero_alpha,
            self.header.global_x_ofs,
            self.header.global_y_ofs,
        );
        Ok(Subtitles {
            seeds: &self.seeds,
            index: 0,
            buf,
            reader,
        })
    }
}

/// An iterator over every caption in a `.sub` file, driven from the
/// seeds an [`Index`] parsed out of the companion `.idx` file.
///
/// Each subpicture is bounded by `[seed.file_offset, next_seed_offset)`
/// or, for the last one, `[seed.file_offset, file_size)`.
#[derive(Debug)]
pub struct Subtitles<'a> {
    seeds: &'a [SubPicture],
    index: usize,
    buf: ByteBuffer,
    reader: SubpictureReader,
}

impl Subtitles<'_> {
    /// Number of subpictures read so far with the forced bit set.
    #[must_use]
    pub const fn num_forced(&self) -> usize {
        self.reader.num_forced()
    }

    /// Read the even/odd RLE byte streams for an already-decoded
    /// subpicture, concatenating its fragments and splitting them at
    /// `pic.even_offset`/`pic.odd_offset`.
    ///
    /// # Errors
    /// Returns [`VobSubError::Buffer`] if a fragment can't be read.
    pub fn read_rle_bytes(&mut self, pic: &SubPicture) -> Result<(Vec<u8>, Vec<u8>), VobSubError> {
        let mut rle = Vec::with_capacity(pic.rle_size as usize);
        for frag in &pic.rle_fragments {
            rle.extend_from_slice(&self.buf.read_bytes(frag.absolute_offset, frag.length)?);
        }
        let even_start = usize::from(pic.even_offset).min(rle.len());
        let odd_start = usize::from(pic.odd_offset).min(rle.len());
        let even = rle[even_start..odd_start.max(even_start)].to_vec();
        let odd = rle[odd_start.max(even_start)..].to_vec();
        Ok((even, odd))
    }
}

impl Iterator for Subtitles<'_> {
    type Item = Result<SubPicture, VobSubError>;

    fn next(&mut self) -> Option<Self::Item> {
        profiling::scope!("Subtitles next");

        let seed = self.seeds.get(self.index)?;
        let mut pic = seed.clone();
        let end_offset = self
            .seeds
            .get(self.index + 1)
            .map_or_else(|| self.buf.size(), |next| next.file_offset);
        self.index += 1;

        match self.reader.read(&mut self.buf, &mut pic, end_offset) {
            Ok(()) => Some(Ok(pic)),
            Err(e) => Some(Err(e)),
        }
    }
}
