//! Huffman tree construction and the tree-driven prefix codec.
//!
//! The builder pools one leaf per distinct symbol in a min-heap keyed by
//! frequency and repeatedly combines the two lightest nodes.  Ties are
//! broken by node creation order (first occurrence in the message, then
//! combination order), which keeps the build deterministic; the tree is
//! serialized next to the payload anyway, so the decoder never has to
//! reproduce the rule.
//!
//! `TreeBasedCodec` drives any prefix tree: encoding walks a precomputed
//! symbol -> bit-path table, decoding walks the tree one bit at a time and
//! resets to the root at each leaf.

use std::cmp::Reverse;
use std::collections::{BinaryHeap,HashMap};
use std::hash::Hash;
use bit_vec::BitVec;
use crate::Error;
use crate::tools::bits::{pack,BitCursor};
use crate::tools::tree::BinaryTree;
use crate::envelope;

/// relative frequencies in first-occurrence order
fn frequencies<T: Copy + Eq + Hash>(message: &[T]) -> (Vec<T>,HashMap<T,u64>) {
    let mut counts: HashMap<T,u64> = HashMap::new();
    let mut order = Vec::new();
    for symbol in message {
        let count = counts.entry(*symbol).or_insert(0);
        if *count == 0 {
            order.push(*symbol);
        }
        *count += 1;
    }
    (order,counts)
}

/// Build an optimal prefix tree from the symbol frequencies of `message`.
pub fn create_huffman_tree<T: Copy + Eq + Hash>(message: &[T]) -> Result<BinaryTree<T>,Error> {
    if message.is_empty() {
        return Err(Error::ConfigError("cannot build a code from an empty message".to_string()));
    }
    let (order,counts) = frequencies(message);
    log::debug!("building huffman tree over {} distinct symbols",order.len());
    let mut tree = BinaryTree::new();
    // the heap key carries each subtree's mass; node ids break ties
    let mut pool: BinaryHeap<Reverse<(u64,usize)>> = BinaryHeap::new();
    for symbol in &order {
        let node = tree.push_leaf(*symbol);
        pool.push(Reverse((counts[symbol],node)));
    }
    while pool.len() >= 2 {
        let Reverse((mass0,node0)) = pool.pop().unwrap();
        let Reverse((mass1,node1)) = pool.pop().unwrap();
        let combined = tree.push_internal(node0,node1);
        pool.push(Reverse((mass0 + mass1,combined)));
    }
    let Reverse((_,root)) = pool.pop().unwrap();
    tree.set_root(root);
    Ok(tree)
}

/// Prefix codec driven by a binary tree and its codeword table.
pub struct TreeBasedCodec<T> {
    tree: BinaryTree<T>,
    table: HashMap<T,BitVec>
}

impl <T: Copy + Eq + Hash> TreeBasedCodec<T> {
    pub fn from_tree(tree: BinaryTree<T>) -> Self {
        let table = tree.walk_table();
        Self {
            tree,
            table
        }
    }
    /// codec from explicit (symbol, codeword) pairs, e.g. a hand-made table
    pub fn from_table(table: &[(T,&str)]) -> Result<Self,Error> {
        Ok(Self::from_tree(BinaryTree::from_codeword_table(table)?))
    }
    /// convenience: count frequencies of `message` and build the Huffman codec
    pub fn from_message(message: &[T]) -> Result<Self,Error> {
        Ok(Self::from_tree(create_huffman_tree(message)?))
    }
    pub fn tree(&self) -> &BinaryTree<T> {
        &self.tree
    }
    pub fn codeword(&self,symbol: T) -> Option<&BitVec> {
        self.table.get(&symbol)
    }
    pub fn encode_to_bits(&self,message: &[T]) -> Result<BitVec,Error> {
        let mut bits = BitVec::new();
        for symbol in message {
            match self.table.get(symbol) {
                Some(codeword) => bits.extend(codeword.iter()),
                None => return Err(Error::InvalidSymbol)
            }
        }
        Ok(bits)
    }
    pub fn encode(&self,message: &[T]) -> Result<Vec<u8>,Error> {
        Ok(pack(&self.encode_to_bits(message)?))
    }
    pub fn decoder<'a>(&'a self,byte_stream: &'a [u8],max_length: Option<usize>) -> TreeDecoder<'a,T> {
        TreeDecoder {
            tree: &self.tree,
            curs: BitCursor::new(byte_stream),
            node: self.tree.root(),
            remaining: max_length,
            failed: false
        }
    }
    pub fn decode(&self,byte_stream: &[u8],max_length: Option<usize>) -> Result<Vec<T>,Error> {
        self.decoder(byte_stream,max_length).collect()
    }
    /// mean codeword length in bits per symbol, weighted by `message`
    pub fn average_codeword_length(&self,message: &[T]) -> Result<f64,Error> {
        let (order,counts) = frequencies(message);
        let mut total = 0.0;
        for symbol in order {
            match self.table.get(&symbol) {
                Some(codeword) => total += counts[&symbol] as f64 * codeword.len() as f64,
                None => return Err(Error::InvalidSymbol)
            }
        }
        Ok(total / message.len() as f64)
    }
}

/// Lazy tree-walk decoder, bounded by an optional symbol count.
pub struct TreeDecoder<'a,T> {
    tree: &'a BinaryTree<T>,
    curs: BitCursor<'a>,
    node: usize,
    remaining: Option<usize>,
    failed: bool
}

impl <'a,T: Copy + Eq + Hash> Iterator for TreeDecoder<'a,T> {
    type Item = Result<T,Error>;
    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.remaining == Some(0) {
            return None;
        }
        // a single-symbol code emits zero bits per symbol, so the stream is
        // empty and only the count bounds the output
        if self.tree.is_leaf(self.tree.root()) {
            return match self.remaining {
                Some(rem) => {
                    self.remaining = Some(rem - 1);
                    Some(Ok(self.tree.terminal(self.tree.root()).unwrap()))
                },
                None => None
            };
        }
        loop {
            let bit = match self.curs.next_bit() {
                Some(bit) => bit,
                None => return None
            };
            match self.tree.consume_bit(self.node,bit) {
                Ok((Some(terminal),root)) => {
                    self.node = root;
                    if let Some(rem) = self.remaining {
                        self.remaining = Some(rem - 1);
                    }
                    return Some(Ok(terminal));
                },
                Ok((None,next)) => {
                    self.node = next;
                },
                Err(e) => {
                    self.failed = true;
                    return Some(Err(e));
                }
            }
        }
    }
}

impl TreeBasedCodec<u8> {
    /// package the serialized tree and the payload into the envelope
    pub fn serialize(&self,message: &[u8]) -> Result<Vec<u8>,Error> {
        let codec_data = pack(&self.tree.serialize()?);
        envelope::wrap(&codec_data,&self.encode(message)?,message.len())
    }
    pub fn decode_byte_stream(byte_stream: &[u8]) -> Result<Vec<u8>,Error> {
        let (codec_data,payload,count) = envelope::parse(byte_stream)?;
        let mut curs = BitCursor::new(codec_data);
        let tree = BinaryTree::deserialize(&mut curs)?;
        let codec = Self::from_tree(tree);
        codec.decode(payload,Some(count))
    }
}

// *************** TESTS *****************

#[test]
fn manual_table_codec() {
    let codec = TreeBasedCodec::from_table(&[
        (b'a',"00"),
        (b'b',"01"),
        (b'c',"100"),
        (b'd',"101"),
        (b'e',"110"),
        (b'f',"111")
    ]).expect("bad table");
    let encoded = codec.encode(b"ffa").expect("encoding failed");
    assert_eq!(encoded,vec![0x3f]);
    assert_eq!(codec.decode(&encoded,Some(3)).expect("decoding failed"),b"ffa".to_vec());
    for word in [&b"a"[..],b"ab",b"deadbeef",b"badcafebadfacebedfed"] {
        let encoded = codec.encode(word).expect("encoding failed");
        assert_eq!(codec.decode(&encoded,Some(word.len())).expect("decoding failed"),word.to_vec());
    }
}

#[test]
fn invalid_symbols_are_rejected() {
    let codec = TreeBasedCodec::from_table(&[(b'a',"0"),(b'b',"1")]).expect("bad table");
    assert!(codec.encode(b"invalid characters!").is_err());
}

#[test]
fn huffman_codeword_lengths() {
    let message = b"aabc";
    let codec = TreeBasedCodec::from_message(message).expect("bad message");
    let mut lengths: Vec<usize> = [b'a',b'b',b'c'].iter()
        .map(|s| codec.codeword(*s).unwrap().len())
        .collect();
    lengths.sort();
    assert_eq!(lengths,vec![1,2,2]);
    let mean = codec.average_codeword_length(message).expect("bad message");
    assert!((mean - 1.5).abs() < 1e-12);
    let encoded = codec.encode(message).expect("encoding failed");
    assert_eq!(codec.decode(&encoded,Some(4)).expect("decoding failed"),message.to_vec());
}

#[test]
fn huffman_table_is_prefix_free() {
    let message = b"the quick brown fox jumps over the lazy dog";
    let codec = TreeBasedCodec::from_message(message).expect("bad message");
    let table: Vec<&BitVec> = message.iter().map(|s| codec.codeword(*s).unwrap()).collect();
    for a in &table {
        for b in &table {
            if a != b {
                let head: BitVec = b.iter().take(a.len()).collect();
                assert_ne!(**a,head);
            }
        }
    }
}

#[test]
fn huffman_beats_fixed_width() {
    let message = b"aaaaaaaabbbbccdde";
    let codec = TreeBasedCodec::from_message(message).expect("bad message");
    let mean = codec.average_codeword_length(message).expect("bad message");
    // five distinct symbols cost 3 bits each under a fixed-width code
    let fixed = crate::rice::FixedCodec::new(crate::rice::distinct_symbols(message)).expect("bad alphabet");
    assert!(mean <= fixed.num_bits() as f64);
}

#[test]
fn single_symbol_message() {
    let message = b"aaaa";
    let codec = TreeBasedCodec::from_message(message).expect("bad message");
    let packaged = codec.serialize(message).expect("serialize failed");
    let restored = TreeBasedCodec::decode_byte_stream(&packaged).expect("decode failed");
    assert_eq!(restored,message.to_vec());
}

#[test]
fn envelope_round_trip() {
    let message = "I am Sam. Sam I am. I do not like this Sam I am.\n".as_bytes();
    let codec = TreeBasedCodec::from_message(message).expect("bad message");
    let packaged = codec.serialize(message).expect("serialize failed");
    let restored = TreeBasedCodec::decode_byte_stream(&packaged).expect("decode failed");
    assert_eq!(restored,message.to_vec());
}

#[test]
fn corrupt_stream_fails_loudly() {
    let codec = TreeBasedCodec::from_table(&[(b'a',"0"),(b'b',"10")]).expect("bad table");
    // bits 11 walk into the missing branch
    let result = codec.decode(&[0x03],Some(1));
    assert!(result.is_err());
}
