//! Arena-backed binary tree for prefix codes.
//!
//! Nodes live in a flat pool and refer to each other by index, so the Huffman
//! builder can combine and re-link subtrees without any shared-ownership
//! acrobatics.  A node is either internal (at least one child, no payload) or
//! a leaf (payload, no children).  The root is tracked so a decoder can reset
//! to it after emitting a symbol.
//!
//! Trees over byte symbols have a portable serialization: a pre-order walk
//! emitting `1` for an internal node and `0` followed by the terminal's 8
//! bits (MSB-first) for a leaf.  The walk is self-delimiting, trailing pad
//! bits are never read.

use std::collections::HashMap;
use std::hash::Hash;
use bit_vec::BitVec;
use crate::Error;
use super::bits::{BitCursor,bits_from_string};

/// depth guard for deserializing untrusted trees
const MAX_DEPTH: usize = 4096;

struct Node<T> {
    child: [Option<usize>;2],
    terminal: Option<T>
}

pub struct BinaryTree<T> {
    nodes: Vec<Node<T>>,
    root: usize
}

impl <T: Copy + Eq + Hash> BinaryTree<T> {
    /// tree with a single empty root node
    pub fn new() -> Self {
        Self {
            nodes: vec![Node { child: [None,None], terminal: None }],
            root: 0
        }
    }
    /// Build a tree from (terminal, codeword) pairs, codewords given as
    /// strings of '0' and '1'.  Fails if any codeword prefixes another.
    pub fn from_codeword_table(table: &[(T,&str)]) -> Result<Self,Error> {
        let mut ans = Self::new();
        for (terminal,codeword) in table {
            let bits = bits_from_string(codeword)?;
            ans.add_codeword(&bits,*terminal)?;
        }
        Ok(ans)
    }
    pub fn root(&self) -> usize {
        self.root
    }
    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }
    pub fn is_leaf(&self,node: usize) -> bool {
        self.nodes[node].terminal.is_some()
    }
    pub fn terminal(&self,node: usize) -> Option<T> {
        self.nodes[node].terminal
    }
    /// append a leaf to the pool, it is not reachable until linked
    pub fn push_leaf(&mut self,terminal: T) -> usize {
        self.nodes.push(Node { child: [None,None], terminal: Some(terminal) });
        self.nodes.len() - 1
    }
    /// append an internal node adopting two pool members
    pub fn push_internal(&mut self,child0: usize,child1: usize) -> usize {
        self.nodes.push(Node { child: [Some(child0),Some(child1)], terminal: None });
        self.nodes.len() - 1
    }
    pub fn set_root(&mut self,node: usize) {
        self.root = node;
    }
    /// Descend from the root along `bits`, creating empty internal nodes as
    /// needed, and place `terminal` at the end.  Fails if the path runs
    /// through or onto an existing terminal, or ends on an internal node.
    pub fn add_codeword(&mut self,bits: &BitVec,terminal: T) -> Result<(),Error> {
        let mut curs = self.root;
        for bit in bits.iter() {
            if self.nodes[curs].terminal.is_some() {
                return Err(Error::ConfigError("codeword table is not prefix-free".to_string()));
            }
            let side = bit as usize;
            curs = match self.nodes[curs].child[side] {
                Some(next) => next,
                None => {
                    self.nodes.push(Node { child: [None,None], terminal: None });
                    let next = self.nodes.len() - 1;
                    self.nodes[curs].child[side] = Some(next);
                    next
                }
            };
        }
        if self.nodes[curs].terminal.is_some() || self.nodes[curs].child.iter().any(|c| c.is_some()) {
            return Err(Error::ConfigError("codeword table is not prefix-free".to_string()));
        }
        self.nodes[curs].terminal = Some(terminal);
        Ok(())
    }
    /// Follow the child indexed by `bit`.  On landing at a leaf return its
    /// terminal and the root, otherwise return the child.  A missing child
    /// means the bit stream does not come from this code.
    pub fn consume_bit(&self,node: usize,bit: u8) -> Result<(Option<T>,usize),Error> {
        match self.nodes[node].child[bit as usize] {
            Some(next) => match self.nodes[next].terminal {
                Some(terminal) => Ok((Some(terminal),self.root)),
                None => Ok((None,next))
            },
            None => Err(Error::CorruptStream)
        }
    }
    /// depth-first walk collecting the symbol -> bit-path table
    pub fn walk_table(&self) -> HashMap<T,BitVec> {
        let mut table = HashMap::new();
        let mut stack: Vec<(usize,BitVec)> = vec![(self.root,BitVec::new())];
        while let Some((node,path)) = stack.pop() {
            if let Some(terminal) = self.nodes[node].terminal {
                table.insert(terminal,path);
                continue;
            }
            for side in [1,0] {
                if let Some(next) = self.nodes[node].child[side] {
                    let mut branch = path.clone();
                    branch.push(side == 1);
                    stack.push((next,branch));
                }
            }
        }
        table
    }
}

impl BinaryTree<u8> {
    /// pre-order serialization, only defined for complete trees
    pub fn serialize(&self) -> Result<BitVec,Error> {
        let mut bits = BitVec::new();
        self.serialize_node(self.root,&mut bits)?;
        Ok(bits)
    }
    fn serialize_node(&self,node: usize,bits: &mut BitVec) -> Result<(),Error> {
        if let Some(terminal) = self.nodes[node].terminal {
            bits.push(false);
            for b in (0..8).rev() {
                bits.push((terminal >> b) & 1 != 0);
            }
            return Ok(());
        }
        match self.nodes[node].child {
            [Some(child0),Some(child1)] => {
                bits.push(true);
                self.serialize_node(child0,bits)?;
                self.serialize_node(child1,bits)
            },
            _ => Err(Error::ConfigError("cannot serialize incomplete prefix tree".to_string()))
        }
    }
    /// rebuild a tree from its pre-order serialization
    pub fn deserialize(curs: &mut BitCursor) -> Result<Self,Error> {
        let mut ans = Self::new();
        let root = ans.deserialize_node(curs,0)?;
        ans.set_root(root);
        Ok(ans)
    }
    fn deserialize_node(&mut self,curs: &mut BitCursor,depth: usize) -> Result<usize,Error> {
        if depth > MAX_DEPTH {
            return Err(Error::CorruptStream);
        }
        match curs.next_bit() {
            Some(1) => {
                let child0 = self.deserialize_node(curs,depth+1)?;
                let child1 = self.deserialize_node(curs,depth+1)?;
                Ok(self.push_internal(child0,child1))
            },
            Some(_) => {
                let terminal = curs.get_code(8)? as u8;
                Ok(self.push_leaf(terminal))
            },
            None => Err(Error::CorruptStream)
        }
    }
}

// *************** TESTS *****************

#[test]
fn codeword_table_round_trip() {
    let table = [(b'a',"00"),(b'b',"01"),(b'c',"100"),(b'd',"101"),(b'e',"110"),(b'f',"111")];
    let tree = BinaryTree::from_codeword_table(&table).expect("bad table");
    let walked = tree.walk_table();
    assert_eq!(walked.len(),6);
    for (terminal,codeword) in table {
        let bits = bits_from_string(codeword).unwrap();
        assert_eq!(walked[&terminal],bits);
    }
}

#[test]
fn prefix_conflicts_are_rejected() {
    assert!(BinaryTree::from_codeword_table(&[(b'a',"0"),(b'b',"01")]).is_err());
    assert!(BinaryTree::from_codeword_table(&[(b'a',"01"),(b'b',"0")]).is_err());
    assert!(BinaryTree::from_codeword_table(&[(b'a',"01"),(b'b',"01")]).is_err());
}

#[test]
fn consume_bit_resets_at_leaves() {
    let tree = BinaryTree::from_codeword_table(&[(b'a',"0"),(b'b',"10"),(b'c',"11")]).expect("bad table");
    let (sym,node) = tree.consume_bit(tree.root(),1).expect("bad bit");
    assert_eq!(sym,None);
    let (sym,node) = tree.consume_bit(node,0).expect("bad bit");
    assert_eq!(sym,Some(b'b'));
    assert_eq!(node,tree.root());
    let (sym,_) = tree.consume_bit(tree.root(),0).expect("bad bit");
    assert_eq!(sym,Some(b'a'));
}

#[test]
fn missing_branch_is_corrupt() {
    let tree = BinaryTree::from_codeword_table(&[(b'a',"0"),(b'b',"10")]).expect("bad table");
    let (_,node) = tree.consume_bit(tree.root(),1).expect("bad bit");
    assert!(tree.consume_bit(node,1).is_err());
}

#[test]
fn serialization_round_trip() {
    let table = [(b'a',"00"),(b'b',"01"),(b'c',"100"),(b'd',"101"),(b'e',"110"),(b'f',"111")];
    let tree = BinaryTree::from_codeword_table(&table).expect("bad table");
    let bits = tree.serialize().expect("incomplete tree");
    let bytes = super::bits::pack(&bits);
    let mut curs = BitCursor::new(&bytes);
    let copy = BinaryTree::deserialize(&mut curs).expect("bad serialization");
    assert_eq!(copy.walk_table(),tree.walk_table());
}

#[test]
fn degenerate_tree_serializes() {
    let mut tree: BinaryTree<u8> = BinaryTree::new();
    let leaf = tree.push_leaf(b'z');
    tree.set_root(leaf);
    let bits = tree.serialize().expect("incomplete tree");
    assert_eq!(bits.len(),9);
    let bytes = super::bits::pack(&bits);
    let mut curs = BitCursor::new(&bytes);
    let copy = BinaryTree::deserialize(&mut curs).expect("bad serialization");
    assert_eq!(copy.terminal(copy.root()),Some(b'z'));
}
