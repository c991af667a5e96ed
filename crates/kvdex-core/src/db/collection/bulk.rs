//! Bulk operations.
//!
//! Per-document work fans out concurrently and every result is collected
//! before returning; one document failing never cancels the others.

use crate::{
    db::{
        CommitResult, DeleteOutcome, Document,
        collection::{Collection, ListOptions, Paged, UpdateOptions},
    },
    error::InternalError,
    value::Value,
};
use futures::future::join_all;
use std::future::Future;

impl Collection {
    /// Add every value under a generated id; results follow input order.
    pub async fn add_many<I>(&self, values: I) -> Vec<Result<CommitResult, InternalError>>
    where
        I: IntoIterator<Item = Value>,
    {
        join_all(values.into_iter().map(|value| self.add(value))).await
    }

    /// Delete every document a listing returns.
    pub async fn delete_many(
        &self,
        options: ListOptions,
    ) -> Result<Paged<Result<DeleteOutcome, InternalError>>, InternalError> {
        let page = self.get_many(options).await?;

        Ok(self.delete_page(page).await)
    }

    /// Apply `patch` to every document a listing returns.
    pub async fn update_many(
        &self,
        patch: Value,
        options: ListOptions,
        update: UpdateOptions,
    ) -> Result<Paged<Result<CommitResult, InternalError>>, InternalError> {
        let page = self.get_many(options).await?;

        Ok(self.update_page(page, &patch, update).await)
    }

    /// Delete every live document whose secondary-indexed field equals `value`.
    pub async fn delete_by_secondary_index(
        &self,
        index: &str,
        value: impl Into<Value>,
        options: ListOptions,
    ) -> Result<Paged<Result<DeleteOutcome, InternalError>>, InternalError> {
        let page = self.find_by_secondary_index(index, value, options).await?;

        Ok(self.delete_page(page).await)
    }

    /// Apply `patch` to every live document whose secondary-indexed field
    /// equals `value`.
    pub async fn update_by_secondary_index(
        &self,
        index: &str,
        value: impl Into<Value>,
        patch: Value,
        options: ListOptions,
        update: UpdateOptions,
    ) -> Result<Paged<Result<CommitResult, InternalError>>, InternalError> {
        let page = self.find_by_secondary_index(index, value, options).await?;

        Ok(self.update_page(page, &patch, update).await)
    }

    /// Run `f` over every document a listing returns and collect its outputs.
    pub async fn map<F, Fut, T>(
        &self,
        options: ListOptions,
        f: F,
    ) -> Result<Paged<T>, InternalError>
    where
        F: Fn(Document) -> Fut,
        Fut: Future<Output = T>,
    {
        let Paged { result, cursor } = self.get_many(options).await?;
        let result = join_all(result.into_iter().map(f)).await;

        Ok(Paged { result, cursor })
    }

    /// Run a fallible `f` over every document a listing returns.
    ///
    /// Every document is visited even when earlier callbacks fail; results
    /// follow listing order.
    pub async fn for_each<F, Fut, E>(
        &self,
        options: ListOptions,
        f: F,
    ) -> Result<Paged<Result<(), E>>, InternalError>
    where
        F: Fn(Document) -> Fut,
        Fut: Future<Output = Result<(), E>>,
    {
        self.map(options, f).await
    }

    async fn delete_page(
        &self,
        page: Paged<Document>,
    ) -> Paged<Result<DeleteOutcome, InternalError>> {
        let result = join_all(page.result.into_iter().map(|doc| self.delete(doc.id))).await;

        Paged {
            result,
            cursor: page.cursor,
        }
    }

    async fn update_page(
        &self,
        page: Paged<Document>,
        patch: &Value,
        update: UpdateOptions,
    ) -> Paged<Result<CommitResult, InternalError>> {
        let result = join_all(
            page.result
                .into_iter()
                .map(|doc| self.update(doc.id, patch.clone(), update)),
        )
        .await;

        Paged {
            result,
            cursor: page.cursor,
        }
    }
}
