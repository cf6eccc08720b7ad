use super::{to_ts, Queries};
use crate::{
    error::{RedemptionError, RedemptionResult},
    model::{DelegationDatum, Network, Price, Product, ProductToken, Token, Wallet},
};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

fn not_found(entity: &'static str, id: &str) -> RedemptionError {
    RedemptionError::NotFound { entity, id: id.to_string() }
}

impl Queries<'_> {
    // ── Reference data: reads ──────────────────────────────────────

    pub fn get_price(&self, id: &str) -> RedemptionResult<Price> {
        self.conn
            .query_row(
                "SELECT id, product_id, price_type, interval_type, term_length, unit_amount, currency
                 FROM price WHERE id = ?1",
                params![id],
                |row| {
                    Ok(Price {
                        id: row.get(0)?,
                        product_id: row.get(1)?,
                        price_type: row.get(2)?,
                        interval_type: row.get(3)?,
                        term_length: row.get(4)?,
                        unit_amount: row.get(5)?,
                        currency: row.get(6)?,
                    })
                },
            )
            .optional()?
            .ok_or_else(|| not_found("price", id))
    }

    pub fn get_product(&self, id: &str) -> RedemptionResult<Product> {
        self.conn
            .query_row(
                "SELECT id, workspace_id, wallet_id, name FROM product WHERE id = ?1 AND active = 1",
                params![id],
                |row| {
                    Ok(Product {
                        id: row.get(0)?,
                        workspace_id: row.get(1)?,
                        wallet_id: row.get(2)?,
                        name: row.get(3)?,
                    })
                },
            )
            .optional()?
            .ok_or_else(|| not_found("product", id))
    }

    pub fn get_product_token(&self, id: &str) -> RedemptionResult<ProductToken> {
        self.conn
            .query_row(
                "SELECT id, product_id, token_id, network_id FROM product_token
                 WHERE id = ?1 AND active = 1",
                params![id],
                |row| {
                    Ok(ProductToken {
                        id: row.get(0)?,
                        product_id: row.get(1)?,
                        token_id: row.get(2)?,
                        network_id: row.get(3)?,
                    })
                },
            )
            .optional()?
            .ok_or_else(|| not_found("product token", id))
    }

    pub fn get_token(&self, id: &str) -> RedemptionResult<Token> {
        self.conn
            .query_row(
                "SELECT id, network_id, symbol, contract_address, decimals FROM token WHERE id = ?1",
                params![id],
                |row| {
                    Ok(Token {
                        id: row.get(0)?,
                        network_id: row.get(1)?,
                        symbol: row.get(2)?,
                        contract_address: row.get(3)?,
                        decimals: row.get::<_, i64>(4)? as u8,
                    })
                },
            )
            .optional()?
            .ok_or_else(|| not_found("token", id))
    }

    pub fn get_network(&self, id: &str) -> RedemptionResult<Network> {
        self.conn
            .query_row(
                "SELECT id, name, chain_id FROM network WHERE id = ?1",
                params![id],
                |row| {
                    Ok(Network {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        chain_id: row.get::<_, i64>(2)? as u64,
                    })
                },
            )
            .optional()?
            .ok_or_else(|| not_found("network", id))
    }

    pub fn get_wallet(&self, id: &str) -> RedemptionResult<Wallet> {
        self.conn
            .query_row(
                "SELECT id, workspace_id, address FROM wallet WHERE id = ?1",
                params![id],
                |row| {
                    Ok(Wallet {
                        id: row.get(0)?,
                        workspace_id: row.get(1)?,
                        address: row.get(2)?,
                    })
                },
            )
            .optional()?
            .ok_or_else(|| not_found("wallet", id))
    }

    pub fn get_delegation(&self, id: &str) -> RedemptionResult<DelegationDatum> {
        self.conn
            .query_row(
                "SELECT id, delegate, delegator, authority, caveats, salt, signature
                 FROM delegation_datum WHERE id = ?1",
                params![id],
                |row| {
                    Ok(DelegationDatum {
                        id: row.get(0)?,
                        delegate: row.get(1)?,
                        delegator: row.get(2)?,
                        authority: row.get(3)?,
                        caveats: row.get(4)?,
                        salt: row.get(5)?,
                        signature: row.get(6)?,
                    })
                },
            )
            .optional()?
            .ok_or_else(|| not_found("delegation", id))
    }

    // ── Reference data: seeding ─────────────────────────────────────
    // Written by the catalog and subscribe flows; exposed for tooling.

    pub fn insert_network(&self, n: &Network) -> RedemptionResult<()> {
        self.conn.execute(
            "INSERT INTO network (id, name, chain_id) VALUES (?1, ?2, ?3)",
            params![n.id, n.name, n.chain_id as i64],
        )?;
        Ok(())
    }

    pub fn insert_token(&self, t: &Token) -> RedemptionResult<()> {
        self.conn.execute(
            "INSERT INTO token (id, network_id, symbol, contract_address, decimals)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![t.id, t.network_id, t.symbol, t.contract_address, i64::from(t.decimals)],
        )?;
        Ok(())
    }

    pub fn insert_product_token(&self, pt: &ProductToken) -> RedemptionResult<()> {
        self.conn.execute(
            "INSERT INTO product_token (id, product_id, token_id, network_id) VALUES (?1, ?2, ?3, ?4)",
            params![pt.id, pt.product_id, pt.token_id, pt.network_id],
        )?;
        Ok(())
    }

    pub fn insert_wallet(&self, w: &Wallet) -> RedemptionResult<()> {
        self.conn.execute(
            "INSERT INTO wallet (id, workspace_id, address) VALUES (?1, ?2, ?3)",
            params![w.id, w.workspace_id, w.address],
        )?;
        Ok(())
    }

    pub fn insert_product(&self, p: &Product) -> RedemptionResult<()> {
        self.conn.execute(
            "INSERT INTO product (id, workspace_id, wallet_id, name) VALUES (?1, ?2, ?3, ?4)",
            params![p.id, p.workspace_id, p.wallet_id, p.name],
        )?;
        Ok(())
    }

    pub fn insert_price(&self, p: &Price) -> RedemptionResult<()> {
        self.conn.execute(
            "INSERT INTO price (id, product_id, price_type, interval_type, term_length, unit_amount, currency)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                p.id,
                p.product_id,
                p.price_type,
                p.interval_type,
                i64::from(p.term_length),
                p.unit_amount,
                p.currency,
            ],
        )?;
        Ok(())
    }

    pub fn insert_delegation(&self, d: &DelegationDatum, created_at: DateTime<Utc>) -> RedemptionResult<()> {
        self.conn.execute(
            "INSERT INTO delegation_datum (id, delegate, delegator, authority, caveats, salt, signature, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                d.id,
                d.delegate,
                d.delegator,
                d.authority,
                d.caveats,
                d.salt,
                d.signature,
                to_ts(created_at),
            ],
        )?;
        Ok(())
    }
}
