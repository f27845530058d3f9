//! BSON encode/decode helpers layered over the `bson` crate.
//!
//! This driver never hand-rolls BSON serialization — `bson::Document`
//! already round-trips through `to_writer`/`from_reader`. What lives here
//! is the part the `bson` crate doesn't do on its own: measuring an
//! encoded document's size and splitting an insert batch so no
//! `OP_INSERT` frame exceeds the target server's `maxMessageSize` or
//! `maxWriteBatchSize`.

use bson::Document;

use crate::error::Result;

/// The number of bytes a document will occupy on the wire, without
/// actually framing it — used to decide whether adding one more document
/// to a batch would overflow the server's `maxMessageSize`.
pub(crate) fn encoded_len(doc: &Document) -> Result<usize> {
    let mut buf = Vec::new();
    doc.to_writer(&mut buf)?;
    Ok(buf.len())
}

/// Splits `documents` into batches such that each batch's header overhead
/// (`header_overhead_bytes`, the frame header plus the collection-name
/// cstring) plus its documents' encoded sizes stay within
/// `max_message_size`, and no batch exceeds `max_write_batch_size`
/// documents.
///
/// A single document that alone exceeds `max_message_size` still gets its
/// own one-document batch — the server will reject it, but that's a
/// `CommandFailure` the caller sees, not a client-side silent drop.
pub(crate) fn split_insert_batches(
    documents: Vec<Document>,
    header_overhead_bytes: usize,
    max_message_size: usize,
    max_write_batch_size: usize,
) -> Result<Vec<Vec<Document>>> {
    let mut batches = Vec::new();
    let mut current = Vec::new();
    let mut current_size = header_overhead_bytes;

    for doc in documents {
        let doc_len = encoded_len(&doc)?;
        let would_overflow_size = current_size + doc_len > max_message_size;
        let would_overflow_count = current.len() >= max_write_batch_size;

        if !current.is_empty() && (would_overflow_size || would_overflow_count) {
            batches.push(std::mem::take(&mut current));
            current_size = header_overhead_bytes;
        }

        current_size += doc_len;
        current.push(doc);
    }

    if !current.is_empty() {
        batches.push(current);
    }

    Ok(batches)
}

#[cfg(test)]
mod test {
    use super::*;
    use bson::doc;

    #[test]
    fn batches_respect_the_document_count_limit() {
        let documents: Vec<Document> = (0..5).map(|i| doc! { "i": i }).collect();
        let batches = split_insert_batches(documents, 32, 1_000_000, 2).unwrap();
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].len(), 2);
        assert_eq!(batches[2].len(), 1);
    }

    #[test]
    fn batches_respect_the_message_size_limit() {
        let documents: Vec<Document> = (0..4).map(|i| doc! { "i": i, "pad": "x".repeat(20) }).collect();
        let per_doc_len = encoded_len(&documents[0]).unwrap();
        let max_message_size = 32 + per_doc_len * 2;
        let batches = split_insert_batches(documents, 32, max_message_size, 1_000).unwrap();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].len(), 2);
        assert_eq!(batches[1].len(), 2);
    }

    #[test]
    fn an_empty_batch_produces_no_batches() {
        let batches = split_insert_batches(Vec::new(), 32, 1_000, 100).unwrap();
        assert!(batches.is_empty());
    }

    #[test]
    fn a_single_oversized_document_still_gets_its_own_batch() {
        let documents = vec![doc! { "pad": "x".repeat(100) }];
        let batches = split_insert_batches(documents, 32, 16, 100).unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 1);
    }
}
