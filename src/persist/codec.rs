//! Columnar layout of the two record families.
//!
//! Trades map one field per column. Depth snapshots keep each book side as a pair of
//! `List<Float64>` columns (prices, sizes) so a row is one snapshot.

use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, BooleanArray, Float64Array, Float64Builder, Int64Array, ListArray, ListBuilder,
};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;

use crate::market_data::types::{DepthSnapshot, Level, StreamKind, TradeRecord};
use crate::persist::types::{PersistError, PersistResult};

/// A record type that can live in the columnar store.
pub trait StoredRecord: Sized + Send + Sync + 'static {
    const KIND: StreamKind;

    /// Key the logical dataset is sorted by.
    fn ordering_key(&self) -> i64;

    fn schema() -> SchemaRef;

    fn encode(records: &[Self]) -> PersistResult<RecordBatch>;

    fn decode(batch: &RecordBatch) -> PersistResult<Vec<Self>>;
}

impl StoredRecord for TradeRecord {
    const KIND: StreamKind = StreamKind::Trades;

    fn ordering_key(&self) -> i64 {
        self.trade_time
    }

    fn schema() -> SchemaRef {
        Arc::new(Schema::new(vec![
            Field::new("event_time", DataType::Int64, false),
            Field::new("trade_time", DataType::Int64, false),
            Field::new("price", DataType::Float64, false),
            Field::new("qty", DataType::Float64, false),
            Field::new("is_buyer_maker", DataType::Boolean, false),
        ]))
    }

    fn encode(records: &[Self]) -> PersistResult<RecordBatch> {
        let columns: Vec<ArrayRef> = vec![
            Arc::new(Int64Array::from_iter_values(records.iter().map(|r| r.event_time))),
            Arc::new(Int64Array::from_iter_values(records.iter().map(|r| r.trade_time))),
            Arc::new(Float64Array::from_iter_values(records.iter().map(|r| r.price))),
            Arc::new(Float64Array::from_iter_values(records.iter().map(|r| r.qty))),
            Arc::new(BooleanArray::from(
                records.iter().map(|r| r.is_buyer_maker).collect::<Vec<_>>(),
            )),
        ];
        Ok(RecordBatch::try_new(Self::schema(), columns)?)
    }

    fn decode(batch: &RecordBatch) -> PersistResult<Vec<Self>> {
        let event_time = column::<Int64Array>(batch, "event_time")?;
        let trade_time = column::<Int64Array>(batch, "trade_time")?;
        let price = column::<Float64Array>(batch, "price")?;
        let qty = column::<Float64Array>(batch, "qty")?;
        let is_buyer_maker = column::<BooleanArray>(batch, "is_buyer_maker")?;

        Ok((0..batch.num_rows())
            .map(|row| TradeRecord {
                event_time: event_time.value(row),
                trade_time: trade_time.value(row),
                price: price.value(row),
                qty: qty.value(row),
                is_buyer_maker: is_buyer_maker.value(row),
            })
            .collect())
    }
}

impl StoredRecord for DepthSnapshot {
    const KIND: StreamKind = StreamKind::Depth;

    fn ordering_key(&self) -> i64 {
        self.event_time
    }

    fn schema() -> SchemaRef {
        Arc::new(Schema::new(vec![
            Field::new("event_time", DataType::Int64, false),
            list_field("bid_prices"),
            list_field("bid_sizes"),
            list_field("ask_prices"),
            list_field("ask_sizes"),
        ]))
    }

    fn encode(records: &[Self]) -> PersistResult<RecordBatch> {
        let mut bid_prices = ListBuilder::new(Float64Builder::new());
        let mut bid_sizes = ListBuilder::new(Float64Builder::new());
        let mut ask_prices = ListBuilder::new(Float64Builder::new());
        let mut ask_sizes = ListBuilder::new(Float64Builder::new());

        for snap in records {
            append_levels(&mut bid_prices, &mut bid_sizes, &snap.bids);
            append_levels(&mut ask_prices, &mut ask_sizes, &snap.asks);
        }

        let columns: Vec<ArrayRef> = vec![
            Arc::new(Int64Array::from_iter_values(records.iter().map(|r| r.event_time))),
            Arc::new(bid_prices.finish()),
            Arc::new(bid_sizes.finish()),
            Arc::new(ask_prices.finish()),
            Arc::new(ask_sizes.finish()),
        ];
        Ok(RecordBatch::try_new(Self::schema(), columns)?)
    }

    fn decode(batch: &RecordBatch) -> PersistResult<Vec<Self>> {
        let event_time = column::<Int64Array>(batch, "event_time")?;
        let bid_prices = column::<ListArray>(batch, "bid_prices")?;
        let bid_sizes = column::<ListArray>(batch, "bid_sizes")?;
        let ask_prices = column::<ListArray>(batch, "ask_prices")?;
        let ask_sizes = column::<ListArray>(batch, "ask_sizes")?;

        (0..batch.num_rows())
            .map(|row| {
                Ok(DepthSnapshot {
                    event_time: event_time.value(row),
                    bids: levels_at(bid_prices, bid_sizes, row)?,
                    asks: levels_at(ask_prices, ask_sizes, row)?,
                })
            })
            .collect()
    }
}

fn list_field(name: &str) -> Field {
    // element field must match what ListBuilder produces
    Field::new(
        name,
        DataType::List(Arc::new(Field::new("item", DataType::Float64, true))),
        false,
    )
}

fn append_levels(
    prices: &mut ListBuilder<Float64Builder>,
    sizes: &mut ListBuilder<Float64Builder>,
    levels: &[Level],
) {
    for level in levels {
        prices.values().append_value(level.price);
        sizes.values().append_value(level.size);
    }
    prices.append(true);
    sizes.append(true);
}

fn levels_at(prices: &ListArray, sizes: &ListArray, row: usize) -> PersistResult<Vec<Level>> {
    let prices = prices.value(row);
    let sizes = sizes.value(row);
    let prices = as_f64(&prices)?;
    let sizes = as_f64(&sizes)?;
    if prices.len() != sizes.len() {
        return Err(PersistError::Schema(format!(
            "row {row}: {} prices but {} sizes",
            prices.len(),
            sizes.len()
        )));
    }
    Ok(prices
        .values()
        .iter()
        .zip(sizes.values().iter())
        .map(|(&price, &size)| Level::new(price, size))
        .collect())
}

fn as_f64(array: &ArrayRef) -> PersistResult<&Float64Array> {
    array
        .as_any()
        .downcast_ref::<Float64Array>()
        .ok_or_else(|| PersistError::Schema("level list is not Float64".into()))
}

fn column<'a, T: Array + 'static>(batch: &'a RecordBatch, name: &str) -> PersistResult<&'a T> {
    let array = batch
        .column_by_name(name)
        .ok_or_else(|| PersistError::Schema(format!("missing column '{name}'")))?;
    if array.null_count() > 0 {
        return Err(PersistError::Schema(format!("column '{name}' contains nulls")));
    }
    array
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| PersistError::Schema(format!("column '{name}' has unexpected type")))
}
