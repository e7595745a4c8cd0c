use tracing::info;
use ulid::Ulid;

use crate::model::*;

use super::conflict::now;
use super::{validate, Engine, EngineError, EngineResult};

impl Engine {
    pub async fn create_owner(&self, input: OwnerInput) -> EngineResult<Owner> {
        validate::fields(&input)?;
        let now = now();
        let owner = Owner {
            id: Ulid::new(),
            name: input.name,
            contact_info: input.contact_info,
            created_at: now,
            updated_at: now,
        };
        let mut tx = self.tx().await?;
        tx.insert_owner(&owner).await?;
        tx.commit().await?;
        info!("owner {} created", owner.id);
        Ok(owner)
    }

    pub async fn list_owners(&self) -> EngineResult<Vec<Owner>> {
        let mut tx = self.tx().await?;
        Ok(tx.owners().await?)
    }

    /// An owner together with the cars it owns.
    pub async fn owner_with_cars(&self, owner_id: Ulid) -> EngineResult<OwnerWithCars> {
        let mut tx = self.tx().await?;
        let owner = tx
            .owner(owner_id)
            .await?
            .ok_or(EngineError::NotFound("owner", owner_id))?;
        let cars = tx.cars_for_owner(owner_id).await?;
        Ok(OwnerWithCars { owner, cars })
    }

    pub async fn update_owner(&self, owner_id: Ulid, input: OwnerInput) -> EngineResult<Owner> {
        validate::fields(&input)?;
        let owner = retry_serializable!("update_owner", async {
            let mut tx = self.tx().await?;
            let mut owner = tx
                .owner(owner_id)
                .await?
                .ok_or(EngineError::NotFound("owner", owner_id))?;
            owner.name = input.name.clone();
            owner.contact_info = input.contact_info.clone();
            owner.updated_at = now();
            tx.update_owner(&owner).await?;
            tx.commit().await?;
            Ok::<_, EngineError>(owner)
        }
        .await)?;
        info!("owner {owner_id} updated");
        Ok(owner)
    }

    /// Refused while any car still references the owner.
    pub async fn delete_owner(&self, owner_id: Ulid) -> EngineResult<()> {
        retry_serializable!("delete_owner", async {
            let mut tx = self.tx().await?;
            if tx.owner(owner_id).await?.is_none() {
                return Err(EngineError::NotFound("owner", owner_id));
            }
            if !tx.cars_for_owner(owner_id).await?.is_empty() {
                return Err(EngineError::HasDependents("owner still has cars"));
            }
            tx.delete_owner(owner_id).await?;
            tx.commit().await?;
            Ok(())
        }
        .await)?;
        info!("owner {owner_id} deleted");
        Ok(())
    }
}
